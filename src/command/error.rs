//! Command errors.

use thiserror::Error;

/// Errors raised by command factories, bodies and undo operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("Command creation failed: {0}")]
    CreationFailed(String),

    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Command '{command}' is not undoable")]
    NotUndoable { command: String },

    #[error("Undo failed: {0}")]
    UndoFailed(String),
}
