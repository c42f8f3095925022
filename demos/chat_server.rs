//! Terminal chat relay: every line a client sends is forwarded to all other clients.
//!
//! Run with `cargo run --example chat_server [pipe-name]`, then attach any number of
//! `chat_client`s under the same name.

use pipemux::{PipeName, Server};
use std::io::{self, prelude::*};

fn main() -> pipemux::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let name = std::env::args().nth(1).unwrap_or_else(|| "pipemux-chat".to_string());
    let name = PipeName::new(name)?;

    let server: Server<String> = Server::new(name.clone());

    let relay = server.clone();
    server.on_client_connected(move |conn| {
        println!("* {} joined ({} online)", conn.name(), relay.connection_count());
        relay.push_message_to_names(
            &format!("* {} joined the chat", conn.name()),
            &others(&relay, conn.id()),
        );
    });

    let relay = server.clone();
    server.on_client_disconnected(move |conn| {
        if let Some(conn) = conn {
            println!("* {} left", conn.name());
            relay.push_message_to_names(
                &format!("* {} left the chat", conn.name()),
                &others(&relay, conn.id()),
            );
        }
    });

    let relay = server.clone();
    server.on_client_message(move |conn, line: &String| {
        println!("<{}> {line}", conn.name());
        relay.push_message_to_names(&format!("<{}> {line}", conn.name()), &others(&relay, conn.id()));
    });

    server.on_error(|conn, error| {
        let who = conn.map_or("listener", |c| c.name());
        eprintln!("! error on {who}: {error}");
    });

    server.start()?;
    println!("chat server up on {name:?}; type lines to broadcast, Ctrl-D to quit");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.map_err(pipemux::Error::from)?;
        if !line.is_empty() {
            server.push_message(&format!("<server> {line}"));
        }
    }

    server.stop();
    Ok(())
}

/// Names of everyone but `sender`.
fn others(server: &Server<String>, sender: u64) -> Vec<String> {
    server
        .connections()
        .into_iter()
        .filter(|c| c.id() != sender)
        .map(|c| c.name().to_string())
        .collect()
}
