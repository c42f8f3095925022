//! Stopping a server nobody ever connected to must not hang on the parked accept.

use crate::util::*;
use pipemux::{PipeName, Server};
use std::time::{Duration, Instant};

pub fn run(name: PipeName) -> TestResult {
    let server: Server<String> = Server::new(name);
    server.start()?;
    color_eyre::eyre::ensure!(
        eventually(|| server.is_running()),
        "listener never came up"
    );

    let started = Instant::now();
    server.stop();
    let elapsed = started.elapsed();

    color_eyre::eyre::ensure!(
        elapsed < Duration::from_secs(5),
        "stop took {elapsed:?}, expected under 5 s"
    );
    color_eyre::eyre::ensure!(
        eventually(|| !server.is_running()),
        "listener still alive after stop"
    );

    // Stopping again is a no-op, not a hang.
    let started = Instant::now();
    server.stop();
    color_eyre::eyre::ensure!(
        started.elapsed() < Duration::from_secs(5),
        "second stop did not return promptly"
    );
    Ok(())
}
