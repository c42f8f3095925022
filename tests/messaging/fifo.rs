//! Push order equals delivery order on a single connection, in both directions.

use crate::util::*;
use pipemux::{Client, PipeName, Server};
use std::sync::mpsc;

const COUNT: u32 = 100;

pub fn run(name: PipeName) -> TestResult {
    let server: Server<u32> = Server::new(name.clone());
    let (inbound_tx, inbound_rx) = mpsc::channel();
    server.on_client_message(move |_, n: &u32| {
        let _ = inbound_tx.send(*n);
    });
    server.start()?;

    let client: Client<u32> = Client::new(name);
    let (reply_tx, reply_rx) = mpsc::channel();
    client.on_message(move |n: &u32| {
        let _ = reply_tx.send(*n);
    });
    client.start()?;
    color_eyre::eyre::ensure!(
        client.wait_for_connection(Some(DEADLINE)),
        "client did not connect"
    );

    for n in 0..COUNT {
        client.push_message(n);
    }
    for expected in 0..COUNT {
        ensure_eq!(recv_within(&inbound_rx, "an inbound message")?, expected);
    }

    for n in 0..COUNT {
        server.push_message_to(n, 1);
    }
    for expected in 0..COUNT {
        ensure_eq!(recv_within(&reply_rx, "an outbound message")?, expected);
    }

    client.stop();
    server.stop();
    Ok(())
}
