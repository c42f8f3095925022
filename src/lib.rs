//! Message-oriented IPC over local named pipes, with one well-known name serving any number of
//! concurrent clients.
//!
//! A [`Server`] listens on a single advertised pipe name. Each connecting [`Client`] is
//! redirected by a two-stage handshake onto a private per-connection pipe, so the well-known name
//! only ever carries one short rendezvous frame and message streams of different clients never
//! share a pipe. Every session runs as a [`Connection`]: a background read loop turning inbound
//! frames into events, a background write loop draining a FIFO send queue, and an exactly-once
//! disconnect notification.
//!
//! Messages are typed: both server and client are parameterized by an inbound type `R` and an
//! outbound type `W`, serialized through a pluggable [`Codec`] ([`Bincode`] by default) into
//! length-prefixed frames. Events are delivered on a caller-nominated [`Scheduler`]: inline on
//! the background threads by default, or pumped through a channel into a thread of your choosing
//! (a UI event loop, say) via [`callback_channel`].
//!
//! On Unix the transport is Unix-domain sockets, on Windows named pipes, both through the
//! `interprocess` crate; pipe names are local to the host.
//!
//! ```no_run
//! use pipemux::{Client, PipeName, Server};
//! use std::time::Duration;
//!
//! fn main() -> pipemux::Result<()> {
//!     let server: Server<String> = Server::new(PipeName::new("echo")?);
//!     server.on_client_message(|conn, message: &String| {
//!         println!("{} said {message}", conn.name());
//!     });
//!     server.start()?;
//!
//!     let client: Client<String> = Client::new(PipeName::new("echo")?);
//!     client.start()?;
//!     client.wait_for_connection(Some(Duration::from_secs(1)));
//!     client.push_message("hello".to_string());
//!
//!     client.stop();
//!     server.stop();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs, clippy::panic_in_result_fn)]

mod client;
pub mod codec;
mod connection;
pub mod error;
mod event;
mod misc;
pub mod pipe;
pub mod scheduler;
mod server;
mod worker;

pub use {
    client::{Client, ClientOptions},
    codec::{Bincode, Codec, MAX_FRAME_LEN},
    connection::Connection,
    error::{Error, Result},
    pipe::{ConnectOptions, PipeName, PipeOptions},
    scheduler::{callback_channel, CallbackPump, InlineScheduler, QueueScheduler, Scheduler},
    server::{Server, ServerOptions},
};
