#![allow(dead_code)]

use std::{
    sync::{Condvar, LockResult, Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Strips the poison marker off a lock acquisition.
///
/// Every pipemux lock guards plain data whose invariants hold between statements, so a panic in
/// another thread never leaves it in a state worth refusing to read.
#[inline]
pub(crate) fn antidote<T>(result: LockResult<T>) -> T {
    result.unwrap_or_else(PoisonError::into_inner)
}

/// An auto-reset event latch.
///
/// `pulse` marks the latch signaled and wakes waiters; the first `wait` that observes the signal
/// consumes it, arming the latch again. Signals are sticky: a pulse delivered before anyone waits
/// is not lost.
#[derive(Debug, Default)]
pub(crate) struct Latch {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl Latch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Signals the latch, waking pending waiters.
    pub(crate) fn pulse(&self) {
        *antidote(self.signaled.lock()) = true;
        self.condvar.notify_all();
    }

    /// Rearms the latch, discarding an unconsumed signal.
    pub(crate) fn reset(&self) {
        *antidote(self.signaled.lock()) = false;
    }

    /// Blocks until the latch is signaled, then consumes the signal. With a timeout, returns
    /// `false` if the signal did not arrive in time.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut signaled = antidote(self.signaled.lock());
        match timeout {
            None => {
                while !*signaled {
                    signaled = antidote(self.condvar.wait(signaled));
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !*signaled {
                    let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                        return false;
                    };
                    let (guard, result) = antidote(self.condvar.wait_timeout(signaled, remaining));
                    signaled = guard;
                    if result.timed_out() && !*signaled {
                        return false;
                    }
                }
            }
        }
        *signaled = false;
        true
    }
}
