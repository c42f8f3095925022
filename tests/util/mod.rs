//! Shared helpers: one-time error-report install, collision-free pipe names and bounded waits.
#![allow(dead_code)]

use pipemux::PipeName;
use std::{
    sync::{mpsc, Once},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

pub type TestResult<T = ()> = color_eyre::eyre::Result<T>;

/// Bound on every wait in the suite; anything slower than this is a failure, not a slow machine.
pub const DEADLINE: Duration = Duration::from_secs(5);

static COLOR_EYRE_INSTALL: Once = Once::new();
pub fn testinit() {
    COLOR_EYRE_INSTALL.call_once(|| {
        let _ = color_eyre::install();
    });
}

/// The 32-bit Xorshift PRNG. Enough randomness to keep test pipe names apart without pulling in
/// the `rand` crate.
#[derive(Copy, Clone, Debug)]
pub struct Xorshift32(pub u32);

impl Xorshift32 {
    pub fn from_id(id: &str) -> Self {
        let mut seed = 0xDEAD_BEEFu32;
        for b in id.bytes() {
            seed = seed.rotate_left(5) ^ u32::from(b);
        }
        // Mix in wall-clock nanoseconds so a rerun never collides with a leftover endpoint.
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|e| e.duration())
            .subsec_nanos();
        Self((seed ^ nanos).max(1))
    }

    pub fn next(&mut self) -> u32 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        self.0
    }
}

/// Allocates a pipe name unique to the calling test.
pub fn test_pipe_name(id: &str) -> PipeName {
    let mut rng = Xorshift32::from_id(id);
    PipeName::new(format!("pipemux-test-{:08x}", rng.next())).expect("generated name is valid")
}

macro_rules! make_id {
    () => {
        concat!(file!(), line!(), column!())
    };
}

/// Receives one value, failing the test if it does not arrive within the suite deadline.
pub fn recv_within<T>(rx: &mpsc::Receiver<T>, what: &str) -> TestResult<T> {
    rx.recv_timeout(DEADLINE)
        .map_err(|_| color_eyre::eyre::eyre!("timed out waiting for {what}"))
}

/// Asserts that nothing arrives on `rx` for a little while.
pub fn ensure_silence<T>(rx: &mpsc::Receiver<T>, what: &str) -> TestResult {
    match rx.recv_timeout(Duration::from_millis(150)) {
        Err(_) => Ok(()),
        Ok(_) => color_eyre::eyre::bail!("unexpected {what}"),
    }
}

/// Polls `condition` until it holds or the suite deadline passes.
pub fn eventually(condition: impl Fn() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < DEADLINE {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

macro_rules! ensure_eq {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left_val, right_val) => {
                ::color_eyre::eyre::ensure!(
                    (left_val == right_val),
                    r#"assertion failed: `(left == right)`
  left: `{:?}`,
 right: `{:?}`"#,
                    left_val,
                    right_val
                );
            }
        }
    };
}
