//! The state machine engine.
//!
//! An [`Fsm`] owns its states and transitions, tracks the current state and
//! turns firings into lifecycle notifications (`starts`, `updates`, `stops`,
//! `cancels`) for its handlers. It is a cheap, clonable handle: clones share
//! the same machine, which lets handlers, timers and embedding machines call
//! back into it while an event is being processed.

use super::error::FsmError;
use super::handler::{deliver, DataHandler, FsmHandler, HandlerId, Notification, Notifier};
use crate::builder::BuildError;
use crate::core::{
    State, StateId, StateKind, TimeoutState, TimerService, Transition, TransitionId, Trigger,
    VirtualClock,
};
use crate::logging::{Logger, TracingLogger};
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::{Rc, Weak};

/// Name given to the initial state of every machine.
pub const INITIAL_STATE_NAME: &str = "init";

pub(crate) struct FsmInner<E: 'static> {
    name: RefCell<String>,
    states: RefCell<Vec<State>>,
    transitions: RefCell<Vec<Rc<Transition<E>>>>,
    current: Cell<StateId>,
    starting_state: Cell<StateId>,
    started: Cell<bool>,
    inner: Cell<bool>,
    log: Cell<bool>,
    notifier: Notifier,
    owner: RefCell<Option<Rc<dyn FsmHandler>>>,
    current_timeout: Cell<Option<TransitionId>>,
    current_sub: Cell<Option<TransitionId>>,
    started_before_event: Cell<bool>,
    last_exit: Cell<Option<StateId>>,
    data_handler: RefCell<Option<Weak<dyn DataHandler>>>,
    observers: RefCell<Vec<Rc<dyn Fn()>>>,
    timers: Rc<dyn TimerService>,
    logger: RefCell<Rc<dyn Logger>>,
}

/// Finite-state machine over events of type `E`.
///
/// # Example
///
/// ```rust
/// use gestalt::builder::TransitionBuilder;
/// use gestalt::fsm::Fsm;
///
/// #[derive(Debug)]
/// enum Button { Press, Release }
///
/// let fsm: Fsm<Button> = Fsm::new();
/// let pressed = fsm.add_standard_state("pressed");
/// let released = fsm.add_terminal_state("released");
///
/// fsm.add_transition(
///     TransitionBuilder::new()
///         .from(fsm.initial())
///         .to(pressed)
///         .on(&["press"], |e: &Button| matches!(e, Button::Press))
///         .build()
///         .unwrap(),
/// )
/// .unwrap();
/// fsm.add_transition(
///     TransitionBuilder::new()
///         .from(pressed)
///         .to(released)
///         .on(&["release"], |e: &Button| matches!(e, Button::Release))
///         .build()
///         .unwrap(),
/// )
/// .unwrap();
///
/// assert!(fsm.process(&Button::Press).unwrap());
/// assert!(fsm.is_started());
/// assert!(fsm.process(&Button::Release).unwrap());
/// assert!(!fsm.is_started());
/// assert_eq!(fsm.last_exit(), Some(released));
/// ```
pub struct Fsm<E: 'static> {
    pub(crate) inner: Rc<FsmInner<E>>,
}

impl<E: 'static> Clone for Fsm<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: 'static> Default for Fsm<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> Fsm<E> {
    /// Create a machine with its own private clock.
    ///
    /// Timed transitions of such a machine can only fire through
    /// [`Fsm::on_timeout`] or zero durations; use [`Fsm::with_timers`] to
    /// share an advanceable clock.
    pub fn new() -> Self {
        Self::with_timers(Rc::new(VirtualClock::new()))
    }

    /// Create a machine whose timed transitions are scheduled on `timers`.
    pub fn with_timers(timers: Rc<dyn TimerService>) -> Self {
        Self {
            inner: Rc::new(FsmInner {
                name: RefCell::new("fsm".to_string()),
                states: RefCell::new(vec![State::new(INITIAL_STATE_NAME, StateKind::Initial)]),
                transitions: RefCell::new(Vec::new()),
                current: Cell::new(StateId::INITIAL),
                starting_state: Cell::new(StateId::INITIAL),
                started: Cell::new(false),
                inner: Cell::new(false),
                log: Cell::new(false),
                notifier: Notifier::default(),
                owner: RefCell::new(None),
                current_timeout: Cell::new(None),
                current_sub: Cell::new(None),
                started_before_event: Cell::new(false),
                last_exit: Cell::new(None),
                data_handler: RefCell::new(None),
                observers: RefCell::new(Vec::new()),
                timers,
                logger: RefCell::new(Rc::new(TracingLogger)),
            }),
        }
    }

    /// Set the name used in log messages.
    pub fn named(self, name: impl Into<String>) -> Self {
        *self.inner.name.borrow_mut() = name.into();
        self
    }

    /// Replace the logger (defaults to [`TracingLogger`]).
    pub fn with_logger(self, logger: Rc<dyn Logger>) -> Self {
        *self.inner.logger.borrow_mut() = logger;
        self
    }

    pub fn name(&self) -> String {
        self.inner.name.borrow().clone()
    }

    /// The timer service timed transitions are scheduled on.
    pub fn timers(&self) -> Rc<dyn TimerService> {
        Rc::clone(&self.inner.timers)
    }

    pub fn initial(&self) -> StateId {
        StateId::INITIAL
    }

    /// Add a state. Only the implicit initial state may be of kind `Initial`.
    pub fn add_state(&self, name: impl Into<String>, kind: StateKind) -> Result<StateId, BuildError> {
        if kind == StateKind::Initial {
            return Err(BuildError::DuplicateInitialState);
        }
        Ok(self.push_state(State::new(name, kind)))
    }

    pub fn add_standard_state(&self, name: impl Into<String>) -> StateId {
        self.push_state(State::new(name, StateKind::Standard))
    }

    pub fn add_terminal_state(&self, name: impl Into<String>) -> StateId {
        self.push_state(State::new(name, StateKind::Terminal))
    }

    pub fn add_cancelling_state(&self, name: impl Into<String>) -> StateId {
        self.push_state(State::new(name, StateKind::Cancelling))
    }

    fn push_state(&self, state: State) -> StateId {
        let mut states = self.inner.states.borrow_mut();
        states.push(state);
        StateId(states.len() - 1)
    }

    pub fn state(&self, id: StateId) -> Option<State> {
        self.inner.states.borrow().get(id.0).cloned()
    }

    /// All states in insertion order, the initial state first.
    pub fn states(&self) -> Vec<State> {
        self.inner.states.borrow().clone()
    }

    fn kind_of(&self, id: StateId) -> Option<StateKind> {
        self.inner.states.borrow().get(id.0).map(State::kind)
    }

    fn state_name(&self, id: StateId) -> String {
        self.inner
            .states
            .borrow()
            .get(id.0)
            .map(|s| s.name().to_string())
            .unwrap_or_else(|| id.to_string())
    }

    /// Add a transition.
    ///
    /// Transitions leaving the same state are tried in insertion order and
    /// the first one that accepts and whose guard holds wins.
    pub fn add_transition(&self, transition: Transition<E>) -> Result<TransitionId, BuildError> {
        let src_kind = self.kind_of(transition.src).ok_or(BuildError::UnknownState {
            index: transition.src.0,
        })?;
        let tgt_kind = self.kind_of(transition.tgt).ok_or(BuildError::UnknownState {
            index: transition.tgt.0,
        })?;

        if !src_kind.can_emit() {
            return Err(BuildError::TransitionFromExitState {
                state: self.state_name(transition.src),
            });
        }
        if !tgt_kind.can_receive() {
            return Err(BuildError::TransitionIntoInitialState);
        }

        let id = TransitionId(self.inner.transitions.borrow().len());

        if let Some(sub) = transition.sub_machine() {
            if Rc::ptr_eq(&sub.inner, &self.inner) || sub.is_inner() {
                return Err(BuildError::InvalidSubMachine {
                    name: sub.name(),
                });
            }
            sub.set_owner(Rc::new(SubMachineBridge {
                parent: Rc::downgrade(&self.inner),
                transition: id,
            }));
        }

        self.inner.transitions.borrow_mut().push(Rc::new(transition));
        Ok(id)
    }

    pub fn transition_count(&self) -> usize {
        self.inner.transitions.borrow().len()
    }

    pub(crate) fn transition(&self, id: TransitionId) -> Option<Rc<Transition<E>>> {
        self.inner.transitions.borrow().get(id.0).cloned()
    }

    /// Transitions leaving `state`, in insertion order.
    pub(crate) fn outgoing(&self, state: StateId) -> Vec<(TransitionId, Rc<Transition<E>>)> {
        self.inner
            .transitions
            .borrow()
            .iter()
            .enumerate()
            .filter(|(_, t)| t.src == state)
            .map(|(i, t)| (TransitionId(i), Rc::clone(t)))
            .collect()
    }

    /// Source and target of every transition, in insertion order.
    pub(crate) fn edges(&self) -> Vec<(StateId, StateId)> {
        self.inner
            .transitions
            .borrow()
            .iter()
            .map(|t| (t.src, t.tgt))
            .collect()
    }

    fn sub_machines(&self) -> Vec<Fsm<E>> {
        self.inner
            .transitions
            .borrow()
            .iter()
            .filter_map(|t| t.sub_machine().cloned())
            .collect()
    }

    pub fn current_state(&self) -> StateId {
        self.inner.current.get()
    }

    pub fn current_state_name(&self) -> String {
        self.state_name(self.current_state())
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.get()
    }

    /// Whether this machine is embedded in another one's transition.
    pub fn is_inner(&self) -> bool {
        self.inner.inner.get()
    }

    /// The terminal or cancelling state through which the latest run ended.
    pub fn last_exit(&self) -> Option<StateId> {
        self.inner.last_exit.get()
    }

    /// Delay the `starts` notification until `state` is reached.
    ///
    /// By default a run starts when the machine leaves its initial state.
    pub fn set_starting_state(&self, state: StateId) -> Result<(), BuildError> {
        match self.kind_of(state) {
            None => Err(BuildError::UnknownState { index: state.0 }),
            Some(StateKind::Cancelling) => Err(BuildError::InvalidStartingState {
                state: self.state_name(state),
            }),
            Some(_) => {
                self.inner.starting_state.set(state);
                Ok(())
            }
        }
    }

    pub fn starting_state(&self) -> StateId {
        self.inner.starting_state.get()
    }

    /// The timed transition currently armed, if any.
    pub fn current_timeout(&self) -> Option<TransitionId> {
        self.inner.current_timeout.get()
    }

    pub fn add_handler(&self, handler: Weak<dyn FsmHandler>) -> HandlerId {
        self.inner.notifier.add(handler)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.inner.notifier.remove(id)
    }

    pub fn handler_count(&self) -> usize {
        self.inner.notifier.len()
    }

    pub fn set_log(&self, log: bool) {
        self.inner.log.set(log);
        for sub in self.sub_machines() {
            sub.set_log(log);
        }
    }

    pub fn set_data_handler(&self, handler: Weak<dyn DataHandler>) {
        *self.inner.data_handler.borrow_mut() = Some(handler);
    }

    /// Call `observer` every time the current state changes.
    pub fn observe_state(&self, observer: Rc<dyn Fn()>) {
        self.inner.observers.borrow_mut().push(observer);
    }

    /// Event kinds the machine can consume from its current state.
    pub fn accepted_events(&self) -> BTreeSet<String> {
        if let Some(sub) = self.active_sub_machine() {
            return sub.accepted_events();
        }
        self.outgoing(self.current_state())
            .iter()
            .flat_map(|(_, t)| t.event_kinds())
            .collect()
    }

    pub(crate) fn initial_event_kinds(&self) -> BTreeSet<String> {
        self.outgoing(StateId::INITIAL)
            .iter()
            .flat_map(|(_, t)| t.event_kinds())
            .collect()
    }

    /// Whether some transition leaving the initial state would fire on `event`.
    pub(crate) fn can_start_with(&self, event: &E) -> bool {
        self.outgoing(StateId::INITIAL)
            .iter()
            .any(|(_, t)| t.accepts(event) && t.guard_holds(&Trigger::Event(event)))
    }

    fn set_owner(&self, owner: Rc<dyn FsmHandler>) {
        *self.inner.owner.borrow_mut() = Some(owner);
        self.inner.inner.set(true);
    }

    fn active_sub_machine(&self) -> Option<Fsm<E>> {
        let id = self.inner.current_sub.get()?;
        self.transition(id).and_then(|t| t.sub_machine().cloned())
    }

    /// Process one event.
    ///
    /// Returns `Ok(true)` if a transition fired. A veto raised by a handler
    /// or an action cancels the interaction and yields `Ok(false)`; any other
    /// error propagates.
    pub fn process(&self, event: &E) -> Result<bool, FsmError> {
        if let Some(sub) = self.active_sub_machine() {
            self.inner.started_before_event.set(self.is_started());
            return sub.process(event);
        }

        let current = self.current_state();
        for (id, transition) in self.outgoing(current) {
            if !transition.accepts(event) || !transition.guard_holds(&Trigger::Event(event)) {
                continue;
            }

            self.log_msg(|| {
                format!(
                    "Transition {} -> {} fired",
                    self.state_name(transition.src),
                    self.state_name(transition.tgt)
                )
            });

            if let Some(sub) = transition.sub_machine() {
                self.stop_current_timeout();
                self.inner.started_before_event.set(self.is_started());
                self.inner.current_sub.set(Some(id));
                let fired = sub.process(event);
                if self.inner.current_sub.get() == Some(id)
                    && !sub.is_started()
                    && sub.current_state() == StateId::INITIAL
                {
                    self.inner.current_sub.set(None);
                }
                return fired;
            }

            return self.fire(&transition, Trigger::Event(event));
        }

        Ok(false)
    }

    /// Fire the armed timed transition if its timer expired.
    ///
    /// Called by the timer callback; calling it without an expired timer
    /// does nothing.
    pub fn on_timeout(&self) -> Result<(), FsmError> {
        let Some(id) = self.inner.current_timeout.get() else {
            return Ok(());
        };
        let Some(transition) = self.transition(id) else {
            return Ok(());
        };
        let Some(state) = transition.timeout().cloned() else {
            return Ok(());
        };
        // A call without an expired timer leaves the armed transition alone.
        if !state.timed_out.get() {
            return Ok(());
        }
        self.inner.current_timeout.set(None);
        if !transition.guard_holds(&Trigger::Timeout) {
            state.timed_out.set(false);
            return Ok(());
        }

        self.log_msg(|| format!("Timeout in state {}", self.state_name(transition.src)));
        let result = self.fire(&transition, Trigger::Timeout);
        state.timed_out.set(false);
        result.map(|_| ())
    }

    fn fire(&self, transition: &Transition<E>, trigger: Trigger<'_, E>) -> Result<bool, FsmError> {
        self.stop_current_timeout();
        let was_started = self.is_started();
        match self.traverse(transition, &trigger, was_started) {
            Ok(()) => Ok(true),
            Err(err) => self.absorb(err),
        }
    }

    fn traverse(
        &self,
        transition: &Transition<E>,
        trigger: &Trigger<'_, E>,
        was_started: bool,
    ) -> Result<(), FsmError> {
        if transition.src == StateId::INITIAL {
            self.check_starting(StateId::INITIAL)?;
        }
        transition.run_action(trigger)?;
        self.enter(transition.tgt, was_started)
    }

    fn enter(&self, target: StateId, was_started: bool) -> Result<(), FsmError> {
        match self.kind_of(target) {
            Some(StateKind::Standard) => {
                self.check_starting(target)?;
                self.set_current(target);
                if was_started {
                    self.on_updating()?;
                }
                self.check_timeout_transition()
            }
            Some(StateKind::Terminal) => {
                self.check_starting(target)?;
                self.inner.last_exit.set(Some(target));
                self.on_terminating()
            }
            Some(StateKind::Cancelling) => {
                self.inner.last_exit.set(Some(target));
                self.on_cancelling()
            }
            Some(StateKind::Initial) | None => {
                self.reinit();
                Ok(())
            }
        }
    }

    /// Turn a veto into the cancelling path; let anything else through.
    fn absorb(&self, err: FsmError) -> Result<bool, FsmError> {
        match err {
            FsmError::Cancelled => {
                self.on_cancelling()?;
                Ok(false)
            }
            other => Err(other),
        }
    }

    fn check_starting(&self, state: StateId) -> Result<(), FsmError> {
        if !self.is_started() && self.starting_state() == state {
            self.on_starting()
        } else {
            Ok(())
        }
    }

    fn on_starting(&self) -> Result<(), FsmError> {
        self.inner.started.set(true);
        self.log_msg(|| "Starting".to_string());
        self.notify(Notification::Starts)
    }

    fn on_updating(&self) -> Result<(), FsmError> {
        if !self.is_started() {
            return Ok(());
        }
        self.log_msg(|| "Updating".to_string());
        self.notify(Notification::Updates)
    }

    fn on_terminating(&self) -> Result<(), FsmError> {
        let result = if self.is_started() {
            self.log_msg(|| "Terminating".to_string());
            self.notify(Notification::Stops)
        } else {
            Ok(())
        };
        // A veto is turned into the cancelling path by the caller, which
        // still needs the started flag.
        if result == Err(FsmError::Cancelled) {
            return result;
        }
        self.reinit_data();
        self.reinit();
        result
    }

    fn on_cancelling(&self) -> Result<(), FsmError> {
        let result = if self.is_started() {
            self.log_msg(|| "Cancelling".to_string());
            self.notify(Notification::Cancels)
        } else {
            Ok(())
        };
        self.reinit_data();
        self.reinit();
        result
    }

    fn notify(&self, notification: Notification) -> Result<(), FsmError> {
        if self.is_inner() {
            let owner = self.inner.owner.borrow().clone();
            return match owner {
                Some(owner) => deliver(owner.as_ref(), notification),
                None => Ok(()),
            };
        }
        self.inner.notifier.notify(notification)
    }

    fn set_current(&self, state: StateId) {
        self.inner.current.set(state);
        let observers = self.inner.observers.borrow().clone();
        for observer in observers {
            observer();
        }
    }

    fn check_timeout_transition(&self) -> Result<(), FsmError> {
        let found = self
            .outgoing(self.current_state())
            .into_iter()
            .find_map(|(id, t)| t.timeout().cloned().map(|state| (id, state)));
        let Some((id, state)) = found else {
            return Ok(());
        };
        self.inner.current_timeout.set(Some(id));
        self.start_timeout(state)
    }

    fn start_timeout(&self, state: Rc<TimeoutState>) -> Result<(), FsmError> {
        if state.armed.get() {
            return Ok(());
        }

        let delay = state.duration();
        if delay.is_zero() {
            state.timed_out.set(true);
            return self.on_timeout();
        }

        state.armed.set(true);
        let armed_at = state.rearm();
        let fsm = Rc::downgrade(&self.inner);
        let pending = Rc::clone(&state);
        let token = self.inner.timers.schedule(
            delay,
            Box::new(move || {
                // Disarmed, or re-armed since this callback was scheduled.
                if pending.generation.get() != armed_at || !pending.armed.replace(false) {
                    return Ok(());
                }
                pending.token.set(None);
                pending.timed_out.set(true);
                match fsm.upgrade() {
                    Some(inner) => Fsm { inner }.on_timeout(),
                    None => Ok(()),
                }
            }),
        );
        state.token.set(Some(token));
        Ok(())
    }

    fn stop_current_timeout(&self) {
        let Some(id) = self.inner.current_timeout.take() else {
            return;
        };
        if let Some(state) = self.transition(id).and_then(|t| t.timeout().cloned()) {
            state.armed.set(false);
            state.rearm();
            if let Some(token) = state.token.take() {
                self.inner.timers.cancel(token);
            }
        }
    }

    fn reinit_data(&self) {
        let handler = self.inner.data_handler.borrow().as_ref().and_then(Weak::upgrade);
        if let Some(handler) = handler {
            handler.reinit_data();
        }
    }

    /// Return to the initial state without touching states, transitions or
    /// handlers.
    pub fn reinit(&self) {
        self.stop_current_timeout();
        self.inner.started.set(false);
        if let Some(sub) = self.active_sub_machine() {
            self.inner.current_sub.set(None);
            sub.reinit();
        }
        self.set_current(StateId::INITIAL);
    }

    /// [`Fsm::reinit`], and clear the interaction payload as well.
    pub fn full_reinit(&self) {
        self.reinit();
        self.reinit_data();
        for sub in self.sub_machines() {
            sub.full_reinit();
        }
    }

    /// Detach every handler, observer and data handler, and reset.
    pub fn uninstall(&self) {
        self.reinit();
        self.inner.notifier.clear();
        self.inner.observers.borrow_mut().clear();
        *self.inner.data_handler.borrow_mut() = None;
        for sub in self.sub_machines() {
            sub.uninstall();
        }
    }

    fn log_msg(&self, msg: impl FnOnce() -> String) {
        if self.inner.log.get() {
            let logger = self.inner.logger.borrow().clone();
            logger.interaction_msg(&self.name(), &msg());
        }
    }

    fn sub_machine_started(&self, id: TransitionId) -> Result<(), FsmError> {
        match self.transition(id) {
            Some(t) if t.src == StateId::INITIAL => self.check_starting(StateId::INITIAL),
            _ => Ok(()),
        }
    }

    fn sub_machine_stopped(&self, id: TransitionId) -> Result<(), FsmError> {
        if self.inner.current_sub.get() != Some(id) {
            return Ok(());
        }
        self.inner.current_sub.set(None);
        let Some(transition) = self.transition(id) else {
            return Ok(());
        };
        let exit = transition
            .sub_machine()
            .and_then(Fsm::last_exit)
            .unwrap_or(StateId::INITIAL);

        transition.run_action(&Trigger::SubMachine(exit))?;
        self.enter(transition.tgt, self.inner.started_before_event.get())
    }

    fn sub_machine_cancelled(&self) -> Result<(), FsmError> {
        self.inner.current_sub.set(None);
        self.on_cancelling()
    }
}

/// Relays an embedded machine's lifecycle to the transition that owns it.
struct SubMachineBridge<E: 'static> {
    parent: Weak<FsmInner<E>>,
    transition: TransitionId,
}

impl<E: 'static> SubMachineBridge<E> {
    fn parent(&self) -> Option<Fsm<E>> {
        self.parent.upgrade().map(|inner| Fsm { inner })
    }
}

impl<E: 'static> FsmHandler for SubMachineBridge<E> {
    fn fsm_starts(&self) -> Result<(), FsmError> {
        match self.parent() {
            Some(parent) => parent.sub_machine_started(self.transition),
            None => Ok(()),
        }
    }

    fn fsm_updates(&self) -> Result<(), FsmError> {
        match self.parent() {
            Some(parent) => parent.on_updating(),
            None => Ok(()),
        }
    }

    fn fsm_stops(&self) -> Result<(), FsmError> {
        match self.parent() {
            Some(parent) => parent.sub_machine_stopped(self.transition),
            None => Ok(()),
        }
    }

    fn fsm_cancels(&self) -> Result<(), FsmError> {
        match self.parent() {
            Some(parent) => parent.sub_machine_cancelled(),
            None => Ok(()),
        }
    }
}

impl<E: 'static> fmt::Debug for Fsm<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fsm")
            .field("name", &self.name())
            .field("current", &self.current_state_name())
            .field("started", &self.is_started())
            .field("inner", &self.is_inner())
            .field("states", &self.inner.states.borrow().len())
            .field("transitions", &self.transition_count())
            .finish()
    }
}
