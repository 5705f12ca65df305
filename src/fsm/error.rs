//! Errors raised while a machine processes events.

use thiserror::Error;

/// Errors returned by `process` and by handler notifications.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FsmError {
    /// In-band veto: a handler or action asks to abort the running
    /// interaction. The machine absorbs it by entering its cancelling path.
    #[error("Interaction cancelled")]
    Cancelled,

    /// Recognizer logic failed inside a transition action.
    #[error("Transition action failed: {0}")]
    ActionFailed(String),

    /// A continuous binding cancelled a command that already had effects
    /// but cannot be undone.
    #[error("Command '{command}' must be undoable to be cancelled after continuous execution")]
    MustBeUndoable { command: String },
}
