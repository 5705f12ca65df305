//! Builder API for ergonomic machine construction.
//!
//! This module provides the fluent [`TransitionBuilder`], the shared
//! [`BuildError`] type, and shorthands for the two most common transition
//! shapes.

pub mod error;
pub mod transition;

pub use error::BuildError;
pub use transition::TransitionBuilder;

use crate::core::{StateId, Transition};
use std::time::Duration;

/// Create an unguarded transition firing on events `accept` recognizes.
///
/// # Example
///
/// ```
/// use gestalt::builder::event_transition;
/// use gestalt::fsm::Fsm;
///
/// let fsm: Fsm<char> = Fsm::new();
/// let typed = fsm.add_terminal_state("typed");
/// let transition = event_transition(fsm.initial(), typed, &["keydown"], |c: &char| c.is_alphabetic())
///     .unwrap();
///
/// fsm.add_transition(transition).unwrap();
/// assert!(fsm.process(&'x').unwrap());
/// ```
pub fn event_transition<E, F>(
    from: StateId,
    to: StateId,
    kinds: &[&str],
    accept: F,
) -> Result<Transition<E>, BuildError>
where
    E: 'static,
    F: Fn(&E) -> bool + 'static,
{
    TransitionBuilder::new().from(from).to(to).on(kinds, accept).build()
}

/// Create an unguarded transition firing after a fixed delay.
///
/// # Example
///
/// ```
/// use gestalt::builder::{timeout_transition, BuildError};
/// use gestalt::core::StateId;
/// use std::time::Duration;
///
/// let result = timeout_transition::<char>(StateId::INITIAL, StateId::INITIAL, Duration::ZERO);
/// assert!(matches!(result, Err(BuildError::NonPositiveTimeout)));
/// ```
pub fn timeout_transition<E: 'static>(
    from: StateId,
    to: StateId,
    delay: Duration,
) -> Result<Transition<E>, BuildError> {
    TransitionBuilder::new().from(from).to(to).after_fixed(delay).build()
}
