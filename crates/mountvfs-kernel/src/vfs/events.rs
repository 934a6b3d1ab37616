//! Synchronous change notification.
//!
//! Handlers run inline, in registration order, on the task that performed
//! the mutation. A panicking handler is caught and logged so the remaining
//! handlers still see the event.

use parking_lot::RwLock;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use mountvfs_types::VfsEvent;

type Handler = Arc<dyn Fn(&VfsEvent) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    list: RwLock<Vec<(u64, Handler)>>,
    next_id: AtomicU64,
}

/// Registry of event handlers.
#[derive(Default)]
pub struct EventBus {
    inner: Arc<Handlers>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Keep the returned [`Subscription`] to remove it
    /// later; dropping the handle leaves the handler registered.
    pub fn subscribe(&self, handler: impl Fn(&VfsEvent) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.list.write().push((id, Arc::new(handler)));
        Subscription {
            id,
            handlers: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every handler.
    ///
    /// The handler list is snapshotted first, so a handler may subscribe or
    /// unsubscribe without deadlocking; such changes apply from the next
    /// event on.
    pub fn emit(&self, event: &VfsEvent) {
        let handlers: Vec<Handler> = self
            .inner
            .list
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::warn!(
                    event = event.subject(),
                    path = event.path(),
                    "event handler panicked"
                );
            }
        }
    }

    /// Number of registered handlers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.list.read().len()
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    handlers: Weak<Handlers>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the handler. Returns false if the bus is already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(handlers) = self.handlers.upgrade() else {
            return false;
        };
        let mut list = handlers.list.write();
        let before = list.len();
        list.retain(|(id, _)| *id != self.id);
        list.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn created(path: &str) -> VfsEvent {
        VfsEvent::FileCreated { path: path.into() }
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let log = log.clone();
            bus.subscribe(move |e| log.lock().push(format!("{}:{}", n, e.path())));
        }
        bus.emit(&created("/x"));

        assert_eq!(*log.lock(), ["0:/x", "1:/x", "2:/x"]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        let sub = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&created("/a"));
        assert!(sub.unsubscribe());
        bus.emit(&created("/b"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let bus = EventBus::new();
        let reached = Arc::new(AtomicU64::new(0));
        let r = reached.clone();

        bus.subscribe(|_| panic!("handler failure"));
        bus.subscribe(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&created("/p"));
        bus.emit(&created("/q"));
        assert_eq!(reached.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handler_may_subscribe_during_emit() {
        let bus = Arc::new(EventBus::new());
        let inner_bus = bus.clone();
        bus.subscribe(move |_| {
            inner_bus.subscribe(|_| {});
        });

        bus.emit(&created("/r"));
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_unsubscribe_after_bus_dropped() {
        let bus = EventBus::new();
        let sub = bus.subscribe(|_| {});
        drop(bus);
        assert!(!sub.unsubscribe());
    }
}
