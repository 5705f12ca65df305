//! Transitions: guarded, directed edges between two states.
//!
//! A transition is a closed set of variants rather than an open class
//! hierarchy. Per-transition behaviour lives in closures (`accept`, `guard`,
//! `action`) supplied at construction.

use crate::core::guard::Guard;
use crate::core::state::StateId;
use crate::core::timer::TimerToken;
use crate::fsm::{Fsm, FsmError};
use std::cell::Cell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Index of a transition inside the machine that owns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionId(pub(crate) usize);

impl TransitionId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What made a transition fire.
///
/// Guards and actions receive the trigger so that one closure can tell a
/// raw event apart from an expired timer or a completed sub-machine.
#[derive(Debug)]
pub enum Trigger<'a, E> {
    /// An external event processed by the machine.
    Event(&'a E),
    /// The source state's timer expired.
    Timeout,
    /// The embedded machine reached the given exit state.
    SubMachine(StateId),
}

impl<E> Clone for Trigger<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Trigger<'_, E> {}

impl<'a, E> Trigger<'a, E> {
    /// The raw event, if an event caused the firing.
    pub fn event(&self) -> Option<&'a E> {
        match self {
            Self::Event(event) => Some(event),
            _ => None,
        }
    }
}

/// Syntactic applicability test for event transitions.
pub type Accept<E> = Rc<dyn Fn(&E) -> bool>;

/// Side effect executed when a transition fires.
///
/// Returning [`FsmError::Cancelled`] vetoes the running interaction; any
/// other error propagates to the caller of `process`.
pub type Action<E> = Rc<dyn Fn(&Trigger<'_, E>) -> Result<(), FsmError>>;

/// Duration source for timed transitions, evaluated each time the timer is armed.
pub type DurationProvider = Rc<dyn Fn() -> Duration>;

/// Timer bookkeeping of a timed transition.
pub struct TimeoutState {
    duration: DurationProvider,
    pub(crate) armed: Cell<bool>,
    pub(crate) timed_out: Cell<bool>,
    pub(crate) token: Cell<Option<TimerToken>>,
    pub(crate) generation: Cell<u64>,
}

impl TimeoutState {
    pub(crate) fn new(duration: DurationProvider) -> Self {
        Self {
            duration,
            armed: Cell::new(false),
            timed_out: Cell::new(false),
            token: Cell::new(None),
            generation: Cell::new(0),
        }
    }

    /// Invalidate every callback scheduled so far and return the new epoch.
    pub(crate) fn rearm(&self) -> u64 {
        let next = self.generation.get().wrapping_add(1);
        self.generation.set(next);
        next
    }

    pub(crate) fn duration(&self) -> Duration {
        (self.duration)()
    }

    /// Whether a timer is currently pending for this transition.
    pub fn is_armed(&self) -> bool {
        self.armed.get()
    }

    /// Whether the timer expired and the transition has not yet consumed it.
    pub fn is_timed_out(&self) -> bool {
        self.timed_out.get()
    }
}

/// The variant set of transitions.
pub enum TransitionKind<E: 'static> {
    /// Fires on an external event accepted by `accept`.
    Event {
        accept: Accept<E>,
        events: BTreeSet<String>,
    },
    /// Fires on its own once the source state has been occupied long enough.
    Timeout(Rc<TimeoutState>),
    /// Delegates to an embedded machine and fires when it terminates.
    SubMachine(Fsm<E>),
}

impl<E: 'static> fmt::Debug for TransitionKind<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event { events, .. } => f.debug_struct("Event").field("events", events).finish(),
            Self::Timeout(state) => f
                .debug_struct("Timeout")
                .field("armed", &state.is_armed())
                .finish(),
            Self::SubMachine(fsm) => f.debug_tuple("SubMachine").field(&fsm.name()).finish(),
        }
    }
}

/// A directed edge from an emitting state to a receiving state.
pub struct Transition<E: 'static> {
    pub(crate) src: StateId,
    pub(crate) tgt: StateId,
    pub(crate) kind: TransitionKind<E>,
    pub(crate) guard: Option<Guard<E>>,
    pub(crate) action: Option<Action<E>>,
}

impl<E: 'static> Transition<E> {
    pub fn source(&self) -> StateId {
        self.src
    }

    pub fn target(&self) -> StateId {
        self.tgt
    }

    pub fn kind(&self) -> &TransitionKind<E> {
        &self.kind
    }

    /// Whether the transition is syntactically applicable to `event`.
    pub fn accepts(&self, event: &E) -> bool {
        match &self.kind {
            TransitionKind::Event { accept, .. } => accept(event),
            TransitionKind::Timeout(_) => false,
            TransitionKind::SubMachine(fsm) => fsm.can_start_with(event),
        }
    }

    /// Whether the guard allows firing for this trigger. No guard means yes.
    pub fn guard_holds(&self, trigger: &Trigger<'_, E>) -> bool {
        self.guard.as_ref().map_or(true, |g| g.check(trigger))
    }

    /// Event kinds this transition can consume next.
    pub fn event_kinds(&self) -> BTreeSet<String> {
        match &self.kind {
            TransitionKind::Event { events, .. } => events.clone(),
            TransitionKind::Timeout(_) => BTreeSet::new(),
            TransitionKind::SubMachine(fsm) => fsm.initial_event_kinds(),
        }
    }

    pub(crate) fn run_action(&self, trigger: &Trigger<'_, E>) -> Result<(), FsmError> {
        match &self.action {
            Some(action) => action(trigger),
            None => Ok(()),
        }
    }

    pub(crate) fn timeout(&self) -> Option<&Rc<TimeoutState>> {
        match &self.kind {
            TransitionKind::Timeout(state) => Some(state),
            _ => None,
        }
    }

    pub(crate) fn sub_machine(&self) -> Option<&Fsm<E>> {
        match &self.kind {
            TransitionKind::SubMachine(fsm) => Some(fsm),
            _ => None,
        }
    }
}

impl<E: 'static> fmt::Debug for Transition<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("src", &self.src)
            .field("tgt", &self.tgt)
            .field("kind", &self.kind)
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Pointer {
        Down(u8),
        Up,
    }

    fn press(guard: Option<Guard<Pointer>>) -> Transition<Pointer> {
        Transition {
            src: StateId::INITIAL,
            tgt: StateId(1),
            kind: TransitionKind::Event {
                accept: Rc::new(|e: &Pointer| matches!(e, Pointer::Down(_))),
                events: ["pointerdown".to_string()].into_iter().collect(),
            },
            guard,
            action: None,
        }
    }

    #[test]
    fn event_transition_accepts_matching_events() {
        let transition = press(None);

        assert!(transition.accepts(&Pointer::Down(0)));
        assert!(!transition.accepts(&Pointer::Up));
        assert_eq!(transition.source(), StateId::INITIAL);
        assert_eq!(transition.target(), StateId(1));
    }

    #[test]
    fn guard_is_checked_separately_from_accept() {
        let transition = press(Some(Guard::new(|t: &Trigger<'_, Pointer>| {
            matches!(t.event(), Some(Pointer::Down(0)))
        })));

        assert!(transition.accepts(&Pointer::Down(2)));
        assert!(!transition.guard_holds(&Trigger::Event(&Pointer::Down(2))));
        assert!(transition.guard_holds(&Trigger::Event(&Pointer::Down(0))));
    }

    #[test]
    fn timeout_transition_never_accepts_events() {
        let transition: Transition<Pointer> = Transition {
            src: StateId(1),
            tgt: StateId(2),
            kind: TransitionKind::Timeout(Rc::new(TimeoutState::new(Rc::new(|| {
                Duration::from_millis(300)
            })))),
            guard: None,
            action: None,
        };

        assert!(!transition.accepts(&Pointer::Up));
        assert!(transition.event_kinds().is_empty());
        assert_eq!(
            transition.timeout().map(|t| t.duration()),
            Some(Duration::from_millis(300))
        );
    }

    #[test]
    fn event_kinds_lists_declared_kinds() {
        let kinds = press(None).event_kinds();
        assert_eq!(kinds.len(), 1);
        assert!(kinds.contains("pointerdown"));
    }

    #[test]
    fn trigger_exposes_event_only_for_events() {
        let event = Pointer::Up;
        assert_eq!(Trigger::Event(&event).event(), Some(&Pointer::Up));
        assert!(Trigger::<Pointer>::Timeout.event().is_none());
        assert!(Trigger::<Pointer>::SubMachine(StateId(3)).event().is_none());
    }
}
