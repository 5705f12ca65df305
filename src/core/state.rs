//! States of a gesture state machine.
//!
//! States are plain values owned by their machine and addressed through a
//! [`StateId`]. The kind of a state decides what entering it means for the
//! running interaction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a state inside the machine that owns it.
///
/// The initial state always has index 0; every other state gets the next
/// index in insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub(crate) usize);

impl StateId {
    /// The entry point every machine is created with.
    pub const INITIAL: StateId = StateId(0);

    /// Position of the state in its machine.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What entering a state means for the interaction.
///
/// # Example
///
/// ```rust
/// use gestalt::core::StateKind;
///
/// assert!(StateKind::Initial.can_emit());
/// assert!(!StateKind::Initial.can_receive());
/// assert!(StateKind::Terminal.is_exit());
/// assert!(StateKind::Cancelling.is_exit());
/// assert!(!StateKind::Standard.is_exit());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    /// Entry point; exactly one per machine, never a transition target.
    Initial,
    /// Ordinary intermediate state.
    Standard,
    /// Entering it completes the interaction successfully.
    Terminal,
    /// Entering it aborts the interaction.
    Cancelling,
}

impl StateKind {
    /// Whether entering a state of this kind ends the current run.
    pub fn is_exit(self) -> bool {
        matches!(self, Self::Terminal | Self::Cancelling)
    }

    /// Whether transitions may leave a state of this kind.
    pub fn can_emit(self) -> bool {
        matches!(self, Self::Initial | Self::Standard)
    }

    /// Whether transitions may enter a state of this kind.
    pub fn can_receive(self) -> bool {
        !matches!(self, Self::Initial)
    }
}

/// A named node of the state graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    name: String,
    kind: StateKind,
}

impl State {
    /// Create a state with the given name and kind.
    pub fn new(name: impl Into<String>, kind: StateKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Name used in logs and diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn is_terminal(&self) -> bool {
        self.kind == StateKind::Terminal
    }

    pub fn is_cancelling(&self) -> bool {
        self.kind == StateKind::Cancelling
    }
}
