//! Commands produced by bindings and their lifecycle.
//!
//! A [`Command`] is the application's unit of work. Bindings wrap each
//! one in a [`TrackedCommand`], which owns the status machine
//! (`Created → Executed → Done`, with `Cancelled`/`Flushed` absorbing) so
//! that implementors only write the body and the optional hooks.

pub mod error;
pub mod registry;

pub use error::CommandError;
pub use registry::{CommandRegistry, HistoryRecord, UndoHistory};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

/// Lifecycle status of a tracked command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Created,
    Executed,
    Done,
    Cancelled,
    Flushed,
}

impl CommandStatus {
    /// Whether the command may still execute or complete.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Created | Self::Executed)
    }
}

/// How an undo registry should retain a finished command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    /// Not retained; the command is flushed right away.
    None,
    /// Retained, but subject to the registry's size limit.
    Limited,
    /// Retained until the registry is cleared.
    Unlimited,
}

/// Application unit of work created by a binding.
pub trait Command: 'static {
    /// The command body.
    fn execution(&mut self) -> Result<(), CommandError>;

    fn can_execute(&self) -> bool {
        true
    }

    /// Capture what `undo` needs. Runs once, before the first execution.
    fn create_memento(&mut self) {}

    /// Whether the command changed anything. `done` tells whether it
    /// completed.
    fn had_effect(&self, done: bool) -> bool {
        done
    }

    fn registration_policy(&self, had_effect: bool) -> RegistrationPolicy {
        if had_effect {
            RegistrationPolicy::Limited
        } else {
            RegistrationPolicy::None
        }
    }

    /// Release retained payload.
    fn flush(&mut self) {}

    fn as_undoable(&self) -> Option<&dyn Undoable> {
        None
    }

    fn as_undoable_mut(&mut self) -> Option<&mut dyn Undoable> {
        None
    }

    fn name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// A command whose effects can be reverted and reapplied.
pub trait Undoable {
    fn undo(&mut self) -> Result<(), CommandError>;

    fn redo(&mut self) -> Result<(), CommandError>;

    /// Label shown for this command in undo menus.
    fn undo_name(&self) -> String;
}

/// A command together with its identity and lifecycle status.
pub struct TrackedCommand<C> {
    id: Uuid,
    created_at: DateTime<Utc>,
    executed_at: Option<DateTime<Utc>>,
    status: CommandStatus,
    command: C,
}

impl<C: Command> TrackedCommand<C> {
    pub fn new(command: C) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            executed_at: None,
            status: CommandStatus::Created,
            command,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the command body last ran successfully.
    pub fn executed_at(&self) -> Option<DateTime<Utc>> {
        self.executed_at
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }

    pub fn inner(&self) -> &C {
        &self.command
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.command
    }

    pub fn name(&self) -> &'static str {
        self.command.name()
    }

    pub fn can_execute(&self) -> bool {
        self.status.is_live() && self.command.can_execute()
    }

    /// Run the command body.
    ///
    /// Returns `Ok(false)` without running anything unless the status is
    /// `Created` or `Executed` and the command can execute.
    pub fn execute(&mut self) -> Result<bool, CommandError> {
        if !self.can_execute() {
            return Ok(false);
        }
        if self.status == CommandStatus::Created {
            self.command.create_memento();
        }
        self.command.execution()?;
        self.status = CommandStatus::Executed;
        self.executed_at = Some(Utc::now());
        Ok(true)
    }

    /// Mark the command as completed. Only allowed from a live status.
    pub fn done(&mut self) -> bool {
        if !self.status.is_live() {
            return false;
        }
        self.status = CommandStatus::Done;
        true
    }

    pub fn is_done(&self) -> bool {
        self.status == CommandStatus::Done
    }

    /// Mark the command as cancelled. A flushed command stays flushed.
    pub fn cancel(&mut self) {
        if self.status == CommandStatus::Flushed {
            return;
        }
        self.status = CommandStatus::Cancelled;
    }

    pub fn flush(&mut self) {
        self.command.flush();
        self.status = CommandStatus::Flushed;
    }

    pub fn had_effect(&self) -> bool {
        self.command.had_effect(self.is_done())
    }

    pub fn registration_policy(&self) -> RegistrationPolicy {
        self.command.registration_policy(self.had_effect())
    }

    pub fn is_undoable(&self) -> bool {
        self.command.as_undoable().is_some()
    }

    pub fn undo(&mut self) -> Result<(), CommandError> {
        let name = self.name();
        match self.command.as_undoable_mut() {
            Some(undoable) => undoable.undo(),
            None => Err(CommandError::NotUndoable {
                command: name.to_string(),
            }),
        }
    }

    pub fn redo(&mut self) -> Result<(), CommandError> {
        let name = self.name();
        match self.command.as_undoable_mut() {
            Some(undoable) => undoable.redo(),
            None => Err(CommandError::NotUndoable {
                command: name.to_string(),
            }),
        }
    }
}

impl<C> fmt::Debug for TrackedCommand<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedCommand")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Type-erased view of a tracked command, as stored by registries.
pub trait AnyCommand {
    fn id(&self) -> Uuid;

    fn name(&self) -> &'static str;

    fn status(&self) -> CommandStatus;

    fn is_undoable(&self) -> bool;

    fn undo_name(&self) -> Option<String>;

    fn undo(&mut self) -> Result<(), CommandError>;

    fn redo(&mut self) -> Result<(), CommandError>;

    fn flush(&mut self);
}

impl<C: Command> AnyCommand for TrackedCommand<C> {
    fn id(&self) -> Uuid {
        TrackedCommand::id(self)
    }

    fn name(&self) -> &'static str {
        TrackedCommand::name(self)
    }

    fn status(&self) -> CommandStatus {
        TrackedCommand::status(self)
    }

    fn is_undoable(&self) -> bool {
        TrackedCommand::is_undoable(self)
    }

    fn undo_name(&self) -> Option<String> {
        self.command.as_undoable().map(|u| u.undo_name())
    }

    fn undo(&mut self) -> Result<(), CommandError> {
        TrackedCommand::undo(self)
    }

    fn redo(&mut self) -> Result<(), CommandError> {
        TrackedCommand::redo(self)
    }

    fn flush(&mut self) {
        TrackedCommand::flush(self)
    }
}

/// A command shared between a binding and a registry.
pub type SharedCommand = Rc<RefCell<dyn AnyCommand>>;
