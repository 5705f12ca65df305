//! Builder for constructing transitions.

use crate::builder::error::BuildError;
use crate::core::{
    Accept, Action, DurationProvider, Guard, StateId, TimeoutState, Transition, TransitionKind,
    Trigger,
};
use crate::fsm::{Fsm, FsmError};
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Duration;

enum PendingTrigger<E: 'static> {
    Event {
        accept: Accept<E>,
        events: BTreeSet<String>,
    },
    Timeout(DurationProvider),
    FixedTimeout(Duration),
    SubMachine(Fsm<E>),
}

/// Builder for constructing transitions with a fluent API.
///
/// A transition needs a source, a target and exactly one trigger: an
/// event filter (`on`/`accept`), a delay (`after`/`after_fixed`) or an
/// embedded machine (`sub_machine`). Setting another trigger replaces the
/// previous one.
pub struct TransitionBuilder<E: 'static> {
    from: Option<StateId>,
    to: Option<StateId>,
    trigger: Option<PendingTrigger<E>>,
    guard: Option<Guard<E>>,
    action: Option<Action<E>>,
}

impl<E: 'static> TransitionBuilder<E> {
    pub fn new() -> Self {
        Self {
            from: None,
            to: None,
            trigger: None,
            guard: None,
            action: None,
        }
    }

    /// Set the source state (required).
    pub fn from(mut self, state: StateId) -> Self {
        self.from = Some(state);
        self
    }

    /// Set the target state (required).
    pub fn to(mut self, state: StateId) -> Self {
        self.to = Some(state);
        self
    }

    /// Fire on events of the given kinds that `accept` recognizes.
    ///
    /// The kinds are what hosts subscribe to while the source state is
    /// current.
    pub fn on<F>(mut self, kinds: &[&str], accept: F) -> Self
    where
        F: Fn(&E) -> bool + 'static,
    {
        self.trigger = Some(PendingTrigger::Event {
            accept: Rc::new(accept),
            events: kinds.iter().map(|k| k.to_string()).collect(),
        });
        self
    }

    /// Fire on events `accept` recognizes, without declaring event kinds.
    pub fn accept<F>(self, accept: F) -> Self
    where
        F: Fn(&E) -> bool + 'static,
    {
        self.on(&[], accept)
    }

    /// Fire once the source state has been current for the duration
    /// returned by `provider`, read each time the timer is armed.
    pub fn after<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Duration + 'static,
    {
        self.trigger = Some(PendingTrigger::Timeout(Rc::new(provider)));
        self
    }

    /// Fire after a fixed delay. A zero delay is rejected by `build`.
    pub fn after_fixed(mut self, delay: Duration) -> Self {
        self.trigger = Some(PendingTrigger::FixedTimeout(delay));
        self
    }

    /// Delegate to `machine`; fire when it reaches a terminal state.
    pub fn sub_machine(mut self, machine: Fsm<E>) -> Self {
        self.trigger = Some(PendingTrigger::SubMachine(machine));
        self
    }

    /// Add a guard predicate (optional).
    pub fn guard(mut self, guard: Guard<E>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Add a guard using a closure (optional).
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Trigger<'_, E>) -> bool + 'static,
    {
        self.guard = Some(Guard::new(predicate));
        self
    }

    /// Run `action` when the transition fires (optional).
    ///
    /// Returning [`FsmError::Cancelled`] cancels the interaction.
    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&Trigger<'_, E>) -> Result<(), FsmError> + 'static,
    {
        self.action = Some(Rc::new(action));
        self
    }

    /// Build the transition.
    pub fn build(self) -> Result<Transition<E>, BuildError> {
        let src = self.from.ok_or(BuildError::MissingFromState)?;
        let tgt = self.to.ok_or(BuildError::MissingToState)?;
        let kind = match self.trigger.ok_or(BuildError::MissingTrigger)? {
            PendingTrigger::Event { accept, events } => TransitionKind::Event { accept, events },
            PendingTrigger::Timeout(provider) => {
                TransitionKind::Timeout(Rc::new(TimeoutState::new(provider)))
            }
            PendingTrigger::FixedTimeout(delay) => {
                if delay.is_zero() {
                    return Err(BuildError::NonPositiveTimeout);
                }
                TransitionKind::Timeout(Rc::new(TimeoutState::new(Rc::new(move || delay))))
            }
            PendingTrigger::SubMachine(machine) => TransitionKind::SubMachine(machine),
        };

        Ok(Transition {
            src,
            tgt,
            kind,
            guard: self.guard,
            action: self.action,
        })
    }
}

impl<E: 'static> Default for TransitionBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Key {
        Down(char),
        Up(char),
    }

    #[test]
    fn builder_validates_required_fields() {
        let result = TransitionBuilder::<Key>::new().from(StateId::INITIAL).build();
        assert!(matches!(result, Err(BuildError::MissingToState)));

        let result = TransitionBuilder::<Key>::new().to(StateId(1)).build();
        assert!(matches!(result, Err(BuildError::MissingFromState)));
    }

    #[test]
    fn builder_requires_a_trigger() {
        let result = TransitionBuilder::<Key>::new()
            .from(StateId::INITIAL)
            .to(StateId(1))
            .build();

        assert!(matches!(result, Err(BuildError::MissingTrigger)));
    }

    #[test]
    fn zero_fixed_delay_is_rejected() {
        let result = TransitionBuilder::<Key>::new()
            .from(StateId(1))
            .to(StateId(2))
            .after_fixed(Duration::ZERO)
            .build();

        assert!(matches!(result, Err(BuildError::NonPositiveTimeout)));
    }

    #[test]
    fn event_transition_with_guard() {
        let transition = TransitionBuilder::new()
            .from(StateId::INITIAL)
            .to(StateId(1))
            .on(&["keydown"], |k: &Key| matches!(k, Key::Down(_)))
            .when(|t| matches!(t.event(), Some(Key::Down('a'))))
            .build()
            .unwrap();

        assert!(transition.accepts(&Key::Down('b')));
        assert!(!transition.accepts(&Key::Up('a')));
        assert!(transition.guard_holds(&Trigger::Event(&Key::Down('a'))));
        assert!(!transition.guard_holds(&Trigger::Event(&Key::Down('b'))));
        assert!(transition.event_kinds().contains("keydown"));
    }

    #[test]
    fn later_trigger_replaces_earlier_one() {
        let transition = TransitionBuilder::new()
            .from(StateId(1))
            .to(StateId(2))
            .accept(|_: &Key| true)
            .after_fixed(Duration::from_millis(300))
            .build()
            .unwrap();

        assert!(!transition.accepts(&Key::Down('a')));
        let timeout = transition.timeout().unwrap();
        assert_eq!(timeout.duration(), Duration::from_millis(300));
    }
}
