//! Guard predicates for controlling transitions.
//!
//! A guard decides whether a transition that accepts an event may actually
//! fire, given whatever machine or interaction state the closure captures.

use super::transition::Trigger;
use std::rc::Rc;

/// Predicate that determines if a transition may fire.
///
/// Guards are evaluated after `accept` and before the transition's action.
/// They should not have side effects: the engine may evaluate a guard
/// without firing the transition (for instance to decide whether a
/// sub-machine can start).
///
/// # Example
///
/// ```rust
/// use gestalt::core::{Guard, Trigger};
///
/// // Only primary-button presses.
/// let primary = Guard::new(|t: &Trigger<'_, u8>| t.event() == Some(&0));
///
/// assert!(primary.check(&Trigger::Event(&0)));
/// assert!(!primary.check(&Trigger::Event(&2)));
/// assert!(!primary.check(&Trigger::Timeout));
/// ```
pub struct Guard<E> {
    predicate: Rc<dyn Fn(&Trigger<'_, E>) -> bool>,
}

impl<E> Guard<E> {
    /// Create a guard from a predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Trigger<'_, E>) -> bool + 'static,
    {
        Guard {
            predicate: Rc::new(predicate),
        }
    }

    /// Check if the guard allows firing for this trigger.
    pub fn check(&self, trigger: &Trigger<'_, E>) -> bool {
        (self.predicate)(trigger)
    }
}

impl<E> Clone for Guard<E> {
    fn clone(&self) -> Self {
        Guard {
            predicate: Rc::clone(&self.predicate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    enum Key {
        Char(char),
        Escape,
    }

    #[test]
    fn guard_allows_matching_events() {
        let guard = Guard::new(|t: &Trigger<'_, Key>| matches!(t.event(), Some(Key::Char(_))));

        assert!(guard.check(&Trigger::Event(&Key::Char('a'))));
        assert!(!guard.check(&Trigger::Event(&Key::Escape)));
    }

    #[test]
    fn guard_can_observe_captured_state() {
        let enabled = Rc::new(Cell::new(false));
        let flag = Rc::clone(&enabled);
        let guard = Guard::new(move |_: &Trigger<'_, Key>| flag.get());

        assert!(!guard.check(&Trigger::Timeout));
        enabled.set(true);
        assert!(guard.check(&Trigger::Timeout));
    }

    #[test]
    fn guard_is_deterministic() {
        let guard = Guard::new(|t: &Trigger<'_, Key>| t.event().is_some());
        let event = Key::Escape;

        let result1 = guard.check(&Trigger::Event(&event));
        let result2 = guard.check(&Trigger::Event(&event));

        assert_eq!(result1, result2);
    }

    #[test]
    fn cloned_guard_shares_predicate() {
        let guard = Guard::new(|t: &Trigger<'_, Key>| matches!(t, Trigger::Timeout));
        let cloned = guard.clone();

        assert!(cloned.check(&Trigger::Timeout));
        assert!(!cloned.check(&Trigger::Event(&Key::Escape)));
    }
}
