//! Typed publish/subscribe.
//!
//! Listeners return `anyhow::Result`; a failing listener is logged and the
//! remaining listeners still receive the event.

use std::fmt;

use tracing::warn;

/// Handle returned by [`EventBus::subscribe`]
pub type ListenerId = u64;

type Listener<E> = Box<dyn FnMut(&E) -> anyhow::Result<()>>;

pub struct EventBus<E> {
    listeners: Vec<(ListenerId, Listener<E>)>,
    next_id: ListenerId,
}

impl<E: fmt::Debug> EventBus<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 1,
        }
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&E) -> anyhow::Result<()> + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Deliver to every listener in subscription order.
    /// Returns the number of listeners that failed.
    pub fn publish(&mut self, event: &E) -> usize {
        let mut failures = 0;
        for (id, listener) in self.listeners.iter_mut() {
            if let Err(e) = listener(event) {
                failures += 1;
                warn!(listener = *id, "Event listener failed on {:?}: {}", event, e);
            }
        }
        failures
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

impl<E: fmt::Debug> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_failing_listener_does_not_stop_dispatch() {
        let mut bus: EventBus<u32> = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        bus.subscribe(|_| Err(anyhow::anyhow!("boom")));
        let sink = seen.clone();
        bus.subscribe(move |e| {
            sink.borrow_mut().push(*e);
            Ok(())
        });

        let failures = bus.publish(&42);
        assert_eq!(failures, 1);
        assert_eq!(*seen.borrow(), vec![42]);
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus: EventBus<u32> = EventBus::new();
        let id = bus.subscribe(|_| Ok(()));
        assert_eq!(bus.len(), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert!(bus.is_empty());
    }
}
