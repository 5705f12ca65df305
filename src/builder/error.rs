//! Build errors for machines, transitions, interactions and bindings.

use crate::fsm::FsmViolation;
use thiserror::Error;

/// Errors raised while assembling static configuration.
///
/// These are construction-time failures: nothing is ever silently
/// downgraded to a working default.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    #[error("Transition source state not specified. Call .from(state)")]
    MissingFromState,

    #[error("Transition target state not specified. Call .to(state)")]
    MissingToState,

    #[error("Transition trigger not specified. Call .on(), .accept(), .after() or .sub_machine()")]
    MissingTrigger,

    #[error("State #{index} does not belong to this machine")]
    UnknownState { index: usize },

    #[error("State '{state}' is terminal or cancelling and cannot have outgoing transitions")]
    TransitionFromExitState { state: String },

    #[error("No transition may target the initial state")]
    TransitionIntoInitialState,

    #[error("A machine has exactly one initial state")]
    DuplicateInitialState,

    #[error("State '{state}' cannot be a starting state")]
    InvalidStartingState { state: String },

    #[error("A concurrent machine needs at least 2 members, got {found}")]
    NotEnoughMembers { found: usize },

    #[error("Timed transitions need a positive duration")]
    NonPositiveTimeout,

    #[error("Machine '{name}' cannot be embedded here: it is this machine or already embedded")]
    InvalidSubMachine { name: String },

    #[error("Machine failed validation: {0:?}")]
    InvalidMachine(Vec<FsmViolation>),

    #[error("Binding has no command factory. Call .to_produce(factory)")]
    MissingCommandFactory,

    #[error("Invalid binding options: {0}")]
    InvalidOptions(String),
}
