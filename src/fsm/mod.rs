//! Machine engine: event processing, lifecycle notifications, timeouts,
//! embedded and concurrent machines.
//!
//! [`StateMachine`] is the seam interactions are written against; both
//! [`Fsm`] and [`ConcurrentFsm`] implement it.

mod concurrent;
mod error;
mod handler;
mod machine;
mod validation;

pub use concurrent::{ConcurrentFsm, CorrelationKey, StopPolicy};
pub use error::FsmError;
pub use handler::{DataHandler, FsmHandler, HandlerId};
pub use machine::{Fsm, INITIAL_STATE_NAME};
pub use validation::FsmViolation;

use std::collections::BTreeSet;
use std::rc::{Rc, Weak};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Operations an interaction needs from the machine that recognizes it.
pub trait StateMachine<E> {
    /// Process one event; `Ok(true)` if the machine advanced.
    fn process(&self, event: &E) -> Result<bool, FsmError>;

    fn is_started(&self) -> bool;

    fn add_handler(&self, handler: Weak<dyn FsmHandler>) -> HandlerId;

    fn remove_handler(&self, id: HandlerId) -> bool;

    fn reinit(&self);

    fn full_reinit(&self);

    fn uninstall(&self);

    fn set_log(&self, log: bool);

    fn set_data_handler(&self, handler: Weak<dyn DataHandler>);

    /// Event kinds the machine can consume next.
    fn accepted_events(&self) -> BTreeSet<String>;

    /// Register a callback run on every change of current state.
    fn observe_state(&self, observer: Rc<dyn Fn()>);

    fn validate(&self) -> Validation<(), NonEmptyVec<FsmViolation>>;
}

impl<E: 'static> StateMachine<E> for Fsm<E> {
    fn process(&self, event: &E) -> Result<bool, FsmError> {
        Fsm::process(self, event)
    }

    fn is_started(&self) -> bool {
        Fsm::is_started(self)
    }

    fn add_handler(&self, handler: Weak<dyn FsmHandler>) -> HandlerId {
        Fsm::add_handler(self, handler)
    }

    fn remove_handler(&self, id: HandlerId) -> bool {
        Fsm::remove_handler(self, id)
    }

    fn reinit(&self) {
        Fsm::reinit(self)
    }

    fn full_reinit(&self) {
        Fsm::full_reinit(self)
    }

    fn uninstall(&self) {
        Fsm::uninstall(self)
    }

    fn set_log(&self, log: bool) {
        Fsm::set_log(self, log)
    }

    fn set_data_handler(&self, handler: Weak<dyn DataHandler>) {
        Fsm::set_data_handler(self, handler)
    }

    fn accepted_events(&self) -> BTreeSet<String> {
        Fsm::accepted_events(self)
    }

    fn observe_state(&self, observer: Rc<dyn Fn()>) {
        Fsm::observe_state(self, observer)
    }

    fn validate(&self) -> Validation<(), NonEmptyVec<FsmViolation>> {
        Fsm::validate(self)
    }
}

impl<E: 'static> StateMachine<E> for ConcurrentFsm<E> {
    fn process(&self, event: &E) -> Result<bool, FsmError> {
        ConcurrentFsm::process(self, event)
    }

    fn is_started(&self) -> bool {
        ConcurrentFsm::is_started(self)
    }

    fn add_handler(&self, handler: Weak<dyn FsmHandler>) -> HandlerId {
        ConcurrentFsm::add_handler(self, handler)
    }

    fn remove_handler(&self, id: HandlerId) -> bool {
        ConcurrentFsm::remove_handler(self, id)
    }

    fn reinit(&self) {
        ConcurrentFsm::reinit(self)
    }

    fn full_reinit(&self) {
        ConcurrentFsm::full_reinit(self)
    }

    fn uninstall(&self) {
        ConcurrentFsm::uninstall(self)
    }

    fn set_log(&self, log: bool) {
        ConcurrentFsm::set_log(self, log)
    }

    fn set_data_handler(&self, handler: Weak<dyn DataHandler>) {
        ConcurrentFsm::set_data_handler(self, handler)
    }

    fn accepted_events(&self) -> BTreeSet<String> {
        ConcurrentFsm::accepted_events(self)
    }

    fn observe_state(&self, observer: Rc<dyn Fn()>) {
        ConcurrentFsm::observe_state(self, observer)
    }

    fn validate(&self) -> Validation<(), NonEmptyVec<FsmViolation>> {
        ConcurrentFsm::validate(self)
    }
}
