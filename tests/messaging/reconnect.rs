//! Auto-reconnect: a client survives its server being stopped and restarted.

use crate::util::*;
use pipemux::{ClientOptions, PipeName, Server};
use std::{sync::mpsc, time::Duration};

pub fn run(name: PipeName) -> TestResult {
    let server: Server<String> = Server::new(name.clone());
    server.start()?;

    let client = ClientOptions::<String>::new(name.clone())
        .auto_reconnect(true)
        .auto_reconnect_delay(Duration::from_millis(50))
        .create();
    let (message_tx, message_rx) = mpsc::channel();
    client.on_message(move |message: &String| {
        let _ = message_tx.send(message.clone());
    });
    client.start()?;
    color_eyre::eyre::ensure!(
        client.wait_for_connection(Some(DEADLINE)),
        "client did not connect the first time"
    );

    server.stop();
    color_eyre::eyre::ensure!(
        client.wait_for_disconnection(Some(DEADLINE)),
        "client did not notice the server going away"
    );

    // A new server under the same name; the reconnect attempt polls until it appears.
    let revived: Server<String> = Server::new(name);
    let (joined_tx, joined_rx) = mpsc::channel();
    revived.on_client_connected(move |conn| {
        let _ = joined_tx.send(conn.id());
    });
    revived.start()?;

    color_eyre::eyre::ensure!(
        client.wait_for_connection(Some(DEADLINE)),
        "client did not reconnect"
    );
    let id = recv_within(&joined_rx, "the reconnected session")?;
    revived.push_message_to("welcome back".to_string(), id);
    ensure_eq!(recv_within(&message_rx, "a message over the new session")?, "welcome back");

    client.stop();
    revived.stop();
    Ok(())
}
