//! Minimal single-threaded observable.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber<T> = Rc<dyn Fn(&T)>;

/// Broadcasts values to subscribers in subscription order.
pub struct Stream<T> {
    next_id: Cell<u64>,
    subscribers: RefCell<Vec<(SubscriptionId, Subscriber<T>)>>,
}

impl<T> Stream<T> {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            subscribers: RefCell::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, subscriber: impl Fn(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.subscribers
            .borrow_mut()
            .push((id, Rc::new(subscriber)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(registered, _)| *registered != id);
        subscribers.len() != before
    }

    /// Deliver `value` to every current subscriber. Subscribers may
    /// subscribe or unsubscribe while being called.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Subscriber<T>> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, s)| Rc::clone(s))
            .collect();
        for subscriber in snapshot {
            subscriber(value);
        }
    }

    pub fn clear(&self) {
        self.subscribers.borrow_mut().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

impl<T> Default for Stream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
