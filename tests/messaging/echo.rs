//! One server, one client, one message each way.

use crate::util::*;
use pipemux::{Client, PipeName, Server};
use std::sync::mpsc;

pub fn run(name: PipeName) -> TestResult {
    let server: Server<String> = Server::new(name.clone());
    let (message_tx, message_rx) = mpsc::channel();
    server.on_client_message(move |conn, message: &String| {
        let _ = message_tx.send((conn.id(), conn.name().to_string(), message.clone()));
    });
    server.start()?;

    let client: Client<String> = Client::new(name);
    let (reply_tx, reply_rx) = mpsc::channel();
    client.on_message(move |message: &String| {
        let _ = reply_tx.send(message.clone());
    });
    client.start()?;
    color_eyre::eyre::ensure!(
        client.wait_for_connection(Some(DEADLINE)),
        "client did not connect"
    );

    client.push_message("hello".to_string());
    let (id, conn_name, message) = recv_within(&message_rx, "the client's message")?;
    ensure_eq!(id, 1);
    ensure_eq!(conn_name, "Client 1");
    ensure_eq!(message, "hello");
    // Exactly once.
    ensure_silence(&message_rx, "duplicate client message")?;

    server.push_message_to("hi".to_string(), id);
    ensure_eq!(recv_within(&reply_rx, "the server's reply")?, "hi");

    client.stop();
    server.stop();
    Ok(())
}
