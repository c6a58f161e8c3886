//! Typed publish/subscribe
//!
//! Producers own an `EventBus<E>`; consumers receive a `Subscription` that
//! removes their handler when dropped or explicitly unsubscribed. A bus
//! never keeps its subscribers alive and a subscription never keeps its bus
//! alive.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Shared event handler
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct BusInner<E> {
    next_id: u64,
    handlers: Vec<(u64, Handler<E>)>,
}

/// Multi-subscriber event bus
pub struct EventBus<E> {
    inner: Arc<Mutex<BusInner<E>>>,
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        EventBus {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    /// Register a handler; it stays registered while the returned
    /// subscription is alive
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.handlers.push((id, Arc::new(handler)));
            id
        };

        let weak: Weak<Mutex<BusInner<E>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().handlers.retain(|(hid, _)| *hid != id);
            }
        })
    }

    /// Deliver an event to every current subscriber.
    /// Handlers run outside the bus lock, so they may subscribe or
    /// unsubscribe re-entrantly. Returns the number of handlers called.
    pub fn emit(&self, event: &E) -> usize {
        let snapshot: Vec<Handler<E>> = self
            .inner
            .lock()
            .handlers
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in &snapshot {
            handler(event);
        }
        snapshot.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().handlers.len()
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        EventBus {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.inner.lock().handlers.len())
            .finish()
    }
}

/// Handle returned by a subscribe call. Dropping it unsubscribes.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Build a subscription from its removal action
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Subscription {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to remove
    pub fn empty() -> Self {
        Subscription { cancel: None }
    }

    /// Remove the handler now
    pub fn unsubscribe(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_all_subscribers() {
        let bus = EventBus::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        let t1 = Arc::clone(&total);
        let _a = bus.subscribe(move |v| {
            t1.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let t2 = Arc::clone(&total);
        let _b = bus.subscribe(move |v| {
            t2.fetch_add(*v as usize, Ordering::SeqCst);
        });

        assert_eq!(bus.emit(&5), 2);
        assert_eq!(total.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_unsubscribe_removes_handler() {
        let bus = EventBus::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let sub = bus.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&());
        sub.unsubscribe();
        bus.emit(&());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::<()>::new();
        {
            let _sub = bus.subscribe(|_| {});
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscription_outliving_bus_is_harmless() {
        let bus = EventBus::<()>::new();
        let sub = bus.subscribe(|_| {});
        drop(bus);
        sub.unsubscribe();
    }

    #[test]
    fn test_handler_may_subscribe_reentrantly() {
        let bus = EventBus::<()>::new();
        let inner_bus = bus.clone();
        let held = Arc::new(Mutex::new(Vec::new()));
        let held_clone = Arc::clone(&held);
        let _sub = bus.subscribe(move |_| {
            held_clone.lock().push(inner_bus.subscribe(|_| {}));
        });

        bus.emit(&());
        assert_eq!(bus.subscriber_count(), 2);
    }
}
