//! Where callbacks run.
//!
//! Every event a [`Server`](crate::Server), [`Client`](crate::Client) or
//! [`Connection`](crate::Connection) raises is posted to the [`Scheduler`] nominated when the
//! component was built. The default, [`InlineScheduler`], runs callbacks right on the background
//! thread that produced them, which is fine for headless services. Consumers with a thread that must own
//! all callbacks (a UI event loop, typically) use [`callback_channel`] and drain the returned
//! [`CallbackPump`] from that thread.

use std::sync::mpsc;

/// A unit of deferred callback work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Decides which thread runs posted callbacks.
pub trait Scheduler: Send + Sync + 'static {
    /// Submits a task. Must not block; ordering of tasks posted from one thread is preserved.
    fn post(&self, task: Task);
}

/// Runs every callback immediately on the posting thread.
#[derive(Copy, Clone, Debug, Default)]
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    #[inline]
    fn post(&self, task: Task) {
        task();
    }
}

/// Creates a scheduler whose callbacks are executed by whoever drains the paired pump.
pub fn callback_channel() -> (QueueScheduler, CallbackPump) {
    let (tx, rx) = mpsc::channel();
    (QueueScheduler { tx }, CallbackPump { rx })
}

/// The posting half of [`callback_channel`]: enqueues callbacks for the pump to run.
#[derive(Clone, Debug)]
pub struct QueueScheduler {
    tx: mpsc::Sender<Task>,
}

impl Scheduler for QueueScheduler {
    fn post(&self, task: Task) {
        if self.tx.send(task).is_err() {
            tracing::warn!("callback pump is gone, dropping a scheduled callback");
        }
    }
}

/// The draining half of [`callback_channel`]. Not `Sync` on purpose: exactly one thread owns
/// callback execution.
#[derive(Debug)]
pub struct CallbackPump {
    rx: mpsc::Receiver<Task>,
}

impl CallbackPump {
    /// Runs every callback queued so far and returns how many ran. Never blocks.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Runs callbacks as they arrive until every paired scheduler handle has been dropped.
    pub fn run(&self) {
        while let Ok(task) = self.rx.recv() {
            task();
        }
    }
}
