use crate::{
    misc::antidote,
    scheduler::Scheduler,
};
use std::sync::{Arc, RwLock};

/// A multicast callback list.
///
/// Subscribers are expected to be registered before the owning component starts; registration is
/// nevertheless safe at any time. Emission clones the subscriber list out of the lock, so no
/// pipemux lock is ever held while user code runs.
pub(crate) struct Event<A> {
    handlers: RwLock<Vec<Arc<dyn Fn(&A) + Send + Sync>>>,
}

impl<A> Default for Event<A> {
    fn default() -> Self {
        Self { handlers: RwLock::new(Vec::new()) }
    }
}

impl<A: Send + 'static> Event<A> {
    pub(crate) fn subscribe(&self, handler: impl Fn(&A) + Send + Sync + 'static) {
        antidote(self.handlers.write()).push(Arc::new(handler));
    }

    /// Posts one delivery of `args` to every subscriber via the scheduler.
    pub(crate) fn emit(&self, scheduler: &Arc<dyn Scheduler>, args: A) {
        let handlers = antidote(self.handlers.read()).clone();
        if handlers.is_empty() {
            return;
        }
        scheduler.post(Box::new(move || {
            for handler in &handlers {
                handler(&args);
            }
        }));
    }

    /// Calls every subscriber in place. For bridging: the caller is already running on the
    /// scheduler, so another hop would only reorder deliveries.
    pub(crate) fn invoke(&self, args: &A) {
        let handlers = antidote(self.handlers.read()).clone();
        for handler in &handlers {
            handler(args);
        }
    }
}
