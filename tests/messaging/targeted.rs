//! Targeted delivery: by id, and by a list of names.

use crate::util::*;
use pipemux::{Client, PipeName, Server};
use std::sync::mpsc;

pub fn run(name: PipeName) -> TestResult {
    let server: Server<String> = Server::new(name.clone());
    server.start()?;

    let mut clients = Vec::new();
    let mut inboxes = Vec::new();
    for n in 1..=3 {
        let client: Client<String> = Client::new(name.clone());
        let (tx, rx) = mpsc::channel();
        client.on_message(move |message: &String| {
            let _ = tx.send(message.clone());
        });
        client.start()?;
        color_eyre::eyre::ensure!(
            client.wait_for_connection(Some(DEADLINE)),
            "client {n} did not connect"
        );
        clients.push(client);
        inboxes.push(rx);
    }
    color_eyre::eyre::ensure!(
        eventually(|| server.connection_count() == 3),
        "expected three registered connections"
    );

    server.push_message_to("x".to_string(), 2);
    ensure_eq!(recv_within(&inboxes[1], "the id-targeted message")?, "x");
    ensure_silence(&inboxes[0], "message at client 1")?;
    ensure_silence(&inboxes[2], "message at client 3")?;

    server.push_message_to_names(&"y".to_string(), &["Client 1", "Client 3"]);
    ensure_eq!(recv_within(&inboxes[0], "the name-targeted message at client 1")?, "y");
    ensure_eq!(recv_within(&inboxes[2], "the name-targeted message at client 3")?, "y");
    ensure_silence(&inboxes[1], "message at client 2")?;

    for client in &clients {
        client.stop();
    }
    server.stop();
    Ok(())
}
