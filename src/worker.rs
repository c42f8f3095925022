use crate::{
    error::{Error, Result},
    scheduler::Scheduler,
};
use std::{sync::Arc, thread};

/// One long-running background action with completion callbacks.
///
/// The action gets a dedicated named OS thread: these are pipe loops that block for arbitrary
/// stretches, never candidates for a pooled slot. Exactly one of the two callbacks fires, posted
/// to the scheduler that was captured from the spawning component: `on_succeeded` when the action
/// returns, `on_error` with the failure when it does not.
pub(crate) struct Worker;

impl Worker {
    pub(crate) fn spawn(
        thread_name: impl Into<String>,
        scheduler: &Arc<dyn Scheduler>,
        work: impl FnOnce() -> Result<()> + Send + 'static,
        on_succeeded: impl FnOnce() + Send + 'static,
        on_error: impl FnOnce(Error) + Send + 'static,
    ) -> Result<thread::JoinHandle<()>> {
        let scheduler = Arc::clone(scheduler);
        let handle = thread::Builder::new()
            .name(thread_name.into())
            .spawn(move || match work() {
                Ok(()) => scheduler.post(Box::new(on_succeeded)),
                Err(e) => scheduler.post(Box::new(move || on_error(e))),
            })?;
        Ok(handle)
    }
}
