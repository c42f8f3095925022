//! The scheduler contract: with a callback channel, every event runs on the draining thread.

use crate::util::*;
use pipemux::{callback_channel, Client, PipeName, ServerOptions};
use std::{
    sync::{mpsc, Arc},
    thread,
    time::{Duration, Instant},
};

pub fn run(name: PipeName) -> TestResult {
    let (scheduler, pump) = callback_channel();
    let server = ServerOptions::<String>::new(name.clone())
        .scheduler(Arc::new(scheduler))
        .create();

    let pump_thread = thread::current().id();
    let (seen_tx, seen_rx) = mpsc::channel();
    server.on_client_connected(move |conn| {
        let _ = seen_tx.send(("connected", conn.id(), thread::current().id()));
    });
    let (message_tx, message_rx) = mpsc::channel();
    server.on_client_message(move |conn, message: &String| {
        let _ = message_tx.send((conn.id(), message.clone(), thread::current().id()));
    });
    server.start()?;

    let client: Client<String> = Client::new(name);
    client.start()?;
    color_eyre::eyre::ensure!(
        client.wait_for_connection(Some(DEADLINE)),
        "client did not connect"
    );
    client.push_message("routed".to_string());

    // Drain callbacks here until both events have landed; nothing may run anywhere else.
    let deadline = Instant::now() + DEADLINE;
    let mut connected = None;
    let mut message = None;
    while (connected.is_none() || message.is_none()) && Instant::now() < deadline {
        pump.drain();
        connected = connected.or_else(|| seen_rx.try_recv().ok());
        message = message.or_else(|| message_rx.try_recv().ok());
        thread::sleep(Duration::from_millis(5));
    }

    let (event, id, on_thread) =
        connected.ok_or_else(|| color_eyre::eyre::eyre!("connected event never arrived"))?;
    ensure_eq!(event, "connected");
    ensure_eq!(id, 1);
    ensure_eq!(on_thread, pump_thread);

    let (id, text, on_thread) =
        message.ok_or_else(|| color_eyre::eyre::eyre!("message event never arrived"))?;
    ensure_eq!(id, 1);
    ensure_eq!(text, "routed");
    ensure_eq!(on_thread, pump_thread);

    client.stop();
    // Keep the pump turning while stop's wake-up handshake produces its events.
    let stopper = thread::spawn(move || server.stop());
    while !stopper.is_finished() {
        pump.drain();
        thread::sleep(Duration::from_millis(5));
    }
    stopper.join().expect("stop panicked");
    pump.drain();
    Ok(())
}
