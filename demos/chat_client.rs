//! Terminal chat client for the `chat_server` demo.
//!
//! Run with `cargo run --example chat_client [pipe-name]`. Everything the server relays is
//! printed by a dedicated callback-pump thread (the same pattern a GUI would use to keep all
//! events on its UI thread) while the main thread forwards stdin lines.

use pipemux::{callback_channel, ClientOptions, PipeName};
use std::{io::{self, prelude::*}, sync::Arc, thread, time::Duration};

fn main() -> pipemux::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let name = std::env::args().nth(1).unwrap_or_else(|| "pipemux-chat".to_string());
    let name = PipeName::new(name)?;

    let (scheduler, pump) = callback_channel();
    let client = ClientOptions::<String>::new(name.clone())
        .scheduler(Arc::new(scheduler))
        .auto_reconnect_delay(Duration::from_millis(250))
        .create();

    client.on_message(|line: &String| println!("{line}"));
    client.on_disconnected(|| println!("* connection lost, reconnecting..."));
    client.on_error(|error| eprintln!("! {error}"));

    // All callbacks run here, in order, regardless of which background thread produced them.
    thread::spawn(move || pump.run());

    client.start()?;
    if client.wait_for_connection(Some(Duration::from_secs(10))) {
        println!("connected to {name:?}; type lines to chat, Ctrl-D to quit");
    } else {
        println!("still waiting for a server on {name:?}...");
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.map_err(pipemux::Error::from)?;
        if !line.is_empty() {
            client.push_message(line);
        }
    }

    client.stop();
    Ok(())
}
