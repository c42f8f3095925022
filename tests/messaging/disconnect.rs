//! A departing client is noticed exactly once, leaves the registry, and its id is never reused.

use crate::util::*;
use pipemux::{Client, PipeName, Server};
use std::sync::mpsc;

pub fn run(name: PipeName) -> TestResult {
    let server: Server<String> = Server::new(name.clone());
    let (gone_tx, gone_rx) = mpsc::channel();
    server.on_client_disconnected(move |conn| {
        let _ = gone_tx.send(conn.map(|c| c.id()));
    });
    server.start()?;

    let client: Client<String> = Client::new(name.clone());
    client.start()?;
    color_eyre::eyre::ensure!(
        client.wait_for_connection(Some(DEADLINE)),
        "client did not connect"
    );
    color_eyre::eyre::ensure!(
        eventually(|| server.connection_count() == 1),
        "connection did not register"
    );

    // The client goes away without any application-level goodbye.
    client.stop();

    ensure_eq!(recv_within(&gone_rx, "the disconnect notification")?, Some(1));
    ensure_silence(&gone_rx, "second disconnect notification")?;
    color_eyre::eyre::ensure!(
        eventually(|| server.connection_count() == 0),
        "connection was not removed from the registry"
    );

    // A fresh session gets a fresh id; 1 is spent for the lifetime of this server.
    let second: Client<String> = Client::new(name);
    second.start()?;
    color_eyre::eyre::ensure!(
        second.wait_for_connection(Some(DEADLINE)),
        "second client did not connect"
    );
    color_eyre::eyre::ensure!(
        eventually(|| server.connections().first().map(|c| c.id()) == Some(2)),
        "second connection did not get id 2"
    );
    ensure_eq!(server.connections()[0].name(), "Client 2");

    second.stop();
    server.stop();
    Ok(())
}
