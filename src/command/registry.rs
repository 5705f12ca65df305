//! Undo registries.
//!
//! Bindings hand every finished command to a [`CommandRegistry`] together
//! with the command's [`RegistrationPolicy`]. [`UndoHistory`] is the
//! bundled registry: it retains commands, bounds `Limited` ones, and keeps
//! undo/redo stacks of the undoable ones.

use super::{AnyCommand, CommandError, CommandStatus, RegistrationPolicy, SharedCommand};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;
use uuid::Uuid;

/// External collaborator receiving finished commands.
pub trait CommandRegistry {
    /// Retain `command` under `policy`. Registering a command that is
    /// already retained replaces the earlier registration.
    fn register(&self, command: SharedCommand, policy: RegistrationPolicy);
}

/// Serializable snapshot of one registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub name: String,
    pub policy: RegistrationPolicy,
    pub status: CommandStatus,
    pub registered_at: DateTime<Utc>,
}

struct Entry {
    command: SharedCommand,
    id: Uuid,
    policy: RegistrationPolicy,
    registered_at: DateTime<Utc>,
}

#[derive(Default)]
struct HistoryInner {
    entries: Vec<Entry>,
    undo: Vec<SharedCommand>,
    redo: Vec<SharedCommand>,
}

/// Bounded command history with undo/redo stacks.
///
/// # Example
///
/// ```rust
/// use gestalt::command::{
///     AnyCommand, Command, CommandError, CommandRegistry, RegistrationPolicy, TrackedCommand,
///     UndoHistory,
/// };
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// struct Rename;
///
/// impl Command for Rename {
///     fn execution(&mut self) -> Result<(), CommandError> {
///         Ok(())
///     }
/// }
///
/// let history = UndoHistory::new(10);
/// let command: Rc<RefCell<dyn AnyCommand>> = Rc::new(RefCell::new(TrackedCommand::new(Rename)));
/// history.register(command, RegistrationPolicy::Limited);
///
/// assert_eq!(history.len(), 1);
/// assert!(!history.can_undo());
/// ```
pub struct UndoHistory {
    max_size: usize,
    inner: RefCell<HistoryInner>,
}

impl UndoHistory {
    /// Create a history retaining at most `max_size` `Limited` commands.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            inner: RefCell::new(HistoryInner::default()),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.inner.borrow().entries.iter().any(|e| e.id == id)
    }

    pub fn can_undo(&self) -> bool {
        !self.inner.borrow().undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.inner.borrow().redo.is_empty()
    }

    /// Label of the command `undo` would revert.
    pub fn undo_name(&self) -> Option<String> {
        let top = self.inner.borrow().undo.last().cloned()?;
        let name = top.borrow().undo_name();
        name
    }

    /// Label of the command `redo` would reapply.
    pub fn redo_name(&self) -> Option<String> {
        let top = self.inner.borrow().redo.last().cloned()?;
        let name = top.borrow().undo_name();
        name
    }

    /// Revert the latest undoable command. `Ok(false)` if there is none.
    pub fn undo(&self) -> Result<bool, CommandError> {
        let Some(command) = self.inner.borrow_mut().undo.pop() else {
            return Ok(false);
        };
        let result = command.borrow_mut().undo();
        if let Err(err) = result {
            self.inner.borrow_mut().undo.push(command);
            return Err(err);
        }
        debug!(command = command.borrow().name(), "Undone");
        self.inner.borrow_mut().redo.push(command);
        Ok(true)
    }

    /// Reapply the latest undone command. `Ok(false)` if there is none.
    pub fn redo(&self) -> Result<bool, CommandError> {
        let Some(command) = self.inner.borrow_mut().redo.pop() else {
            return Ok(false);
        };
        let result = command.borrow_mut().redo();
        if let Err(err) = result {
            self.inner.borrow_mut().redo.push(command);
            return Err(err);
        }
        debug!(command = command.borrow().name(), "Redone");
        self.inner.borrow_mut().undo.push(command);
        Ok(true)
    }

    /// Snapshot of retained registrations, oldest first.
    pub fn records(&self) -> Vec<HistoryRecord> {
        self.inner
            .borrow()
            .entries
            .iter()
            .map(|e| {
                let command = e.command.borrow();
                HistoryRecord {
                    id: e.id,
                    name: command.name().to_string(),
                    policy: e.policy,
                    status: command.status(),
                    registered_at: e.registered_at,
                }
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.records())
    }

    /// Drop every command, flushing each one.
    pub fn clear(&self) {
        let entries = {
            let mut inner = self.inner.borrow_mut();
            inner.undo.clear();
            inner.redo.clear();
            std::mem::take(&mut inner.entries)
        };
        for entry in entries {
            entry.command.borrow_mut().flush();
        }
    }

    fn evict_overflow(&self) -> Vec<SharedCommand> {
        let mut inner = self.inner.borrow_mut();
        let mut evicted = Vec::new();

        while inner
            .entries
            .iter()
            .filter(|e| e.policy == RegistrationPolicy::Limited)
            .count()
            > self.max_size
        {
            let Some(oldest) = inner
                .entries
                .iter()
                .position(|e| e.policy == RegistrationPolicy::Limited)
            else {
                break;
            };
            let entry = inner.entries.remove(oldest);
            inner.undo.retain(|c| !Rc::ptr_eq(c, &entry.command));
            inner.redo.retain(|c| !Rc::ptr_eq(c, &entry.command));
            evicted.push(entry.command);
        }
        evicted
    }
}

impl CommandRegistry for UndoHistory {
    fn register(&self, command: SharedCommand, policy: RegistrationPolicy) {
        if policy == RegistrationPolicy::None {
            return;
        }

        let (id, undoable) = {
            let c = command.borrow();
            (c.id(), c.is_undoable())
        };

        {
            let mut inner = self.inner.borrow_mut();
            // Last write wins: a re-registered command moves to the end.
            inner.entries.retain(|e| e.id != id);
            inner.undo.retain(|c| !Rc::ptr_eq(c, &command));
            inner.entries.push(Entry {
                command: Rc::clone(&command),
                id,
                policy,
                registered_at: Utc::now(),
            });
            if undoable {
                inner.undo.push(Rc::clone(&command));
                inner.redo.clear();
            }
        }
        debug!(%id, ?policy, "Command registered");

        for evicted in self.evict_overflow() {
            evicted.borrow_mut().flush();
        }
    }
}

impl fmt::Debug for UndoHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("UndoHistory")
            .field("max_size", &self.max_size)
            .field("entries", &inner.entries.len())
            .field("undo", &inner.undo.len())
            .field("redo", &inner.redo.len())
            .finish()
    }
}
