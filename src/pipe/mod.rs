//! The pipe factory: naming, server-side endpoints and client-side connection establishment.
//!
//! pipemux rides on local sockets (Unix-domain sockets on Unix, named pipes on Windows). This
//! module owns the three concerns the rest of the crate needs from the transport: resolving a
//! logical [`PipeName`] to a platform endpoint, creating and accepting on server endpoints, and
//! the client-side "wait until the name exists, then connect" dance of the handshake protocol.

mod listener;
mod name;
mod stream;

pub use {
    listener::PipeListener,
    name::{PipeName, PipeOptions},
    stream::ConnectOptions,
};
pub(crate) use stream::{connect, ShutdownHandle};

pub(crate) type LocalStream = interprocess::local_socket::Stream;
