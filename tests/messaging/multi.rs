//! Three concurrent clients: ids follow accept order, names map to the right sessions.

use crate::util::*;
use pipemux::{Client, PipeName, Server};
use std::{collections::HashMap, sync::mpsc};

pub fn run(name: PipeName) -> TestResult {
    let server: Server<String> = Server::new(name.clone());
    let (message_tx, message_rx) = mpsc::channel();
    server.on_client_message(move |conn, message: &String| {
        let _ = message_tx.send((conn.id(), conn.name().to_string(), message.clone()));
    });
    server.start()?;

    // Start the clients one by one so the accept order is the label order.
    let mut clients = Vec::new();
    for label in ["A", "B", "C"] {
        let client: Client<String> = Client::new(name.clone());
        client.start()?;
        color_eyre::eyre::ensure!(
            client.wait_for_connection(Some(DEADLINE)),
            "client {label} did not connect"
        );
        clients.push((label, client));
    }
    color_eyre::eyre::ensure!(
        eventually(|| server.connection_count() == 3),
        "expected three registered connections"
    );

    for (label, client) in &clients {
        client.push_message(label.to_string());
    }

    let mut seen = HashMap::new();
    for _ in 0..3 {
        let (id, conn_name, message) = recv_within(&message_rx, "a client message")?;
        ensure_eq!(conn_name, format!("Client {id}"));
        seen.insert(message, id);
    }
    ensure_eq!(seen.len(), 3);
    ensure_eq!(seen["A"], 1);
    ensure_eq!(seen["B"], 2);
    ensure_eq!(seen["C"], 3);

    for (_, client) in &clients {
        client.stop();
    }
    server.stop();
    Ok(())
}
