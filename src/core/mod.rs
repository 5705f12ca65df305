//! Building blocks of the state graph.
//!
//! This module contains the values a machine is made of:
//! - States and their kinds
//! - Guard predicates for transition control
//! - Transitions and the triggers that fire them
//! - Timer delivery for timed transitions

mod guard;
mod state;
mod timer;
mod transition;

pub use guard::Guard;
pub use state::{State, StateId, StateKind};
pub use timer::{TimerCallback, TimerService, TimerToken, VirtualClock};
pub use transition::{
    Accept, Action, DurationProvider, TimeoutState, Transition, TransitionId, TransitionKind,
    Trigger,
};
