//! Lifecycle observers of a machine and their registry.

use super::error::FsmError;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Weak;

/// Receives the lifecycle notifications of a machine.
///
/// Every method defaults to doing nothing. Returning
/// [`FsmError::Cancelled`] from `fsm_starts`, `fsm_updates` or `fsm_stops`
/// vetoes the interaction: the machine enters its cancelling path before the
/// notifying call returns. Other errors propagate to the caller of
/// `process`.
pub trait FsmHandler {
    fn fsm_starts(&self) -> Result<(), FsmError> {
        Ok(())
    }

    fn fsm_updates(&self) -> Result<(), FsmError> {
        Ok(())
    }

    fn fsm_stops(&self) -> Result<(), FsmError> {
        Ok(())
    }

    fn fsm_cancels(&self) -> Result<(), FsmError> {
        Ok(())
    }
}

/// Owner of the payload filled by transition actions.
pub trait DataHandler {
    /// Clear the payload so the interaction can be reused.
    fn reinit_data(&self);
}

/// Registration handle returned by `add_handler`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Notification {
    Starts,
    Updates,
    Stops,
    Cancels,
}

pub(crate) fn deliver(handler: &dyn FsmHandler, notification: Notification) -> Result<(), FsmError> {
    match notification {
        Notification::Starts => handler.fsm_starts(),
        Notification::Updates => handler.fsm_updates(),
        Notification::Stops => handler.fsm_stops(),
        Notification::Cancels => handler.fsm_cancels(),
    }
}

/// Ordered, non-owning handler registry.
///
/// Handlers are held through `Weak` references: the registry never keeps a
/// handler alive, and dropped handlers are pruned on the next dispatch.
#[derive(Default)]
pub(crate) struct Notifier {
    next_id: Cell<u64>,
    handlers: RefCell<Vec<(HandlerId, Weak<dyn FsmHandler>)>>,
}

impl Notifier {
    pub(crate) fn add(&self, handler: Weak<dyn FsmHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.handlers.borrow_mut().push((id, handler));
        id
    }

    pub(crate) fn remove(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|(registered, _)| *registered != id);
        handlers.len() != before
    }

    pub(crate) fn clear(&self) {
        self.handlers.borrow_mut().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.borrow().len()
    }

    fn contains(&self, id: HandlerId) -> bool {
        self.handlers.borrow().iter().any(|(registered, _)| *registered == id)
    }

    /// Notify handlers in registration order.
    ///
    /// A handler removed by an earlier handler of the same dispatch is
    /// skipped. Cancel notifications reach every handler and ignore vetoes;
    /// the other notifications stop at the first error.
    pub(crate) fn notify(&self, notification: Notification) -> Result<(), FsmError> {
        let snapshot: Vec<(HandlerId, Weak<dyn FsmHandler>)> = self.handlers.borrow().clone();

        for (id, weak) in snapshot {
            if !self.contains(id) {
                continue;
            }
            let Some(handler) = weak.upgrade() else {
                self.remove(id);
                continue;
            };
            match deliver(handler.as_ref(), notification) {
                Ok(()) => {}
                Err(FsmError::Cancelled) if notification == Notification::Cancels => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier").field("handlers", &self.len()).finish()
    }
}
