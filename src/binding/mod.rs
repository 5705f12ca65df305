//! Bindings: turning interaction lifecycles into commands.
//!
//! A [`Binding`] listens to its interaction's machine and drives one
//! command per use:
//!
//! - `starts`: create the command (if `when_start` holds) and run `first`
//! - `updates`: create it late, or run `then` (and execute, in continuous
//!   mode)
//! - `stops`: execute if needed, classify the effect, hand the command to
//!   the registry
//! - `cancels`: cancel the command, undoing it first if it already ran
//!
//! Build one with [`BindingBuilder`].

pub mod builder;
pub mod options;
pub mod stream;

pub use builder::BindingBuilder;
pub use options::BindingOptions;
pub use stream::{Stream, SubscriptionId};

use crate::command::{
    Command, CommandError, CommandRegistry, CommandStatus, RegistrationPolicy, TrackedCommand,
};
use crate::fsm::{FsmError, FsmHandler, HandlerId};
use crate::interaction::{Interaction, InteractionData};
use crate::logging::{LogLevel, Logger};
use chrono::{DateTime, Utc};
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

pub(crate) type Factory<D, C> = Box<dyn Fn(&D) -> Result<C, CommandError>>;
pub(crate) type CommandCallback<D, C> = Box<dyn Fn(&mut C, &D)>;
pub(crate) type DataCallback<D> = Box<dyn Fn(&D)>;
pub(crate) type Predicate<D> = Box<dyn Fn(&D) -> bool>;

/// A command shared between a binding, its `produced` subscribers and a
/// registry.
pub type Produced<C> = Rc<RefCell<TrackedCommand<C>>>;

pub(crate) struct Callbacks<D, C> {
    pub(crate) first: Option<CommandCallback<D, C>>,
    pub(crate) then: Option<CommandCallback<D, C>>,
    pub(crate) end: Option<CommandCallback<D, C>>,
    pub(crate) cancel: Option<DataCallback<D>>,
    pub(crate) end_or_cancel: Option<DataCallback<D>>,
    pub(crate) if_cannot_execute: Option<CommandCallback<D, C>>,
    pub(crate) if_had_effects: Option<CommandCallback<D, C>>,
    pub(crate) if_had_no_effect: Option<CommandCallback<D, C>>,
    pub(crate) when: Option<Predicate<D>>,
    pub(crate) when_start: Option<Predicate<D>>,
    pub(crate) when_update: Option<Predicate<D>>,
    pub(crate) when_stop: Option<Predicate<D>>,
}

impl<D, C> Default for Callbacks<D, C> {
    fn default() -> Self {
        Self {
            first: None,
            then: None,
            end: None,
            cancel: None,
            end_or_cancel: None,
            if_cannot_execute: None,
            if_had_effects: None,
            if_had_no_effect: None,
            when: None,
            when_start: None,
            when_update: None,
            when_stop: None,
        }
    }
}

/// Links an interaction to the command it produces.
///
/// The interaction's machine holds the binding weakly: dropping the last
/// `Rc<Binding>` detaches it.
pub struct Binding<D: InteractionData, E: 'static, C: Command> {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    interaction: Rc<Interaction<D, E>>,
    factory: Factory<D, C>,
    callbacks: Callbacks<D, C>,
    continuous: bool,
    registry: Option<Rc<dyn CommandRegistry>>,
    logger: Rc<dyn Logger>,
    log_levels: BTreeSet<LogLevel>,
    command: RefCell<Option<Produced<C>>>,
    times_ended: Cell<usize>,
    times_cancelled: Cell<usize>,
    activated: Cell<bool>,
    handler_id: Cell<Option<HandlerId>>,
    usage_started: Cell<Option<DateTime<Utc>>>,
    produced: Stream<Produced<C>>,
}

impl<D: InteractionData, E: 'static, C: Command> Binding<D, E, C> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn interaction(&self) -> &Rc<Interaction<D, E>> {
        &self.interaction
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    /// Uses that ended normally.
    pub fn times_ended(&self) -> usize {
        self.times_ended.get()
    }

    /// Uses that were cancelled while holding a command.
    pub fn times_cancelled(&self) -> usize {
        self.times_cancelled.get()
    }

    pub fn is_activated(&self) -> bool {
        self.activated.get()
    }

    /// Deactivating drops the held command (flushed) and resets the
    /// interaction.
    pub fn set_activated(&self, activated: bool) {
        self.activated.set(activated);
        self.interaction.set_activated(activated);
        if !activated {
            let held = self.command.borrow_mut().take();
            if let Some(command) = held {
                command.borrow_mut().flush();
                self.log_binding(|| "Deactivated; held command flushed".to_string());
            }
        }
    }

    /// Whether a use is in progress and holds a command.
    pub fn is_running(&self) -> bool {
        self.interaction.is_running()
    }

    /// Status of the command held by the current use, if any.
    pub fn command_status(&self) -> Option<CommandStatus> {
        self.command.borrow().as_ref().map(|c| c.borrow().status())
    }

    /// Commands that completed, emitted once per successful use.
    pub fn produced(&self) -> &Stream<Produced<C>> {
        &self.produced
    }

    /// Detach from the interaction for good.
    pub fn uninstall_binding(&self) {
        self.set_activated(false);
        if let Some(id) = self.handler_id.take() {
            self.interaction.machine().remove_handler(id);
        }
        self.interaction.uninstall();
        self.produced.clear();
    }

    pub(crate) fn set_handler_id(&self, id: HandlerId) {
        self.handler_id.set(Some(id));
    }

    fn holds(&self, predicate: &Option<Predicate<D>>) -> bool {
        match predicate {
            Some(predicate) => predicate(&*self.interaction.data()),
            None => true,
        }
    }

    fn when_start(&self) -> bool {
        self.holds(&self.callbacks.when) && self.holds(&self.callbacks.when_start)
    }

    fn when_update(&self) -> bool {
        self.holds(&self.callbacks.when) && self.holds(&self.callbacks.when_update)
    }

    fn when_stop(&self) -> bool {
        self.holds(&self.callbacks.when) && self.holds(&self.callbacks.when_stop)
    }

    fn with_command(&self, command: &Produced<C>, callback: &Option<CommandCallback<D, C>>) {
        if let Some(callback) = callback {
            let data = self.interaction.data();
            let mut command = command.borrow_mut();
            callback(command.inner_mut(), &*data);
        }
    }

    fn with_data(&self, callback: &Option<DataCallback<D>>) {
        if let Some(callback) = callback {
            callback(&*self.interaction.data());
        }
    }

    /// Create the command of this use. A failing factory is logged and
    /// leaves the binding without a command.
    fn create_command(&self) {
        let created = (self.factory)(&*self.interaction.data());
        let command = match created {
            Ok(command) => command,
            Err(err) => {
                self.log_error("Command creation failed", &err);
                return;
            }
        };

        let command: Produced<C> = Rc::new(RefCell::new(TrackedCommand::new(command)));
        self.log_command(&command, "Command created");
        *self.command.borrow_mut() = Some(Rc::clone(&command));
        self.with_command(&command, &self.callbacks.first);

        if self.continuous {
            self.execute(&command);
        }
    }

    /// Run the command body; failures are logged and count as not run.
    fn execute(&self, command: &Produced<C>) -> bool {
        if !command.borrow().can_execute() {
            self.with_command(command, &self.callbacks.if_cannot_execute);
            return false;
        }
        let result = command.borrow_mut().execute();
        match result {
            Ok(executed) => {
                if executed {
                    self.log_command(command, "Command executed");
                }
                executed
            }
            Err(err) => {
                self.log_error("Command execution failed", &err);
                false
            }
        }
    }

    fn finish(&self, command: Produced<C>) {
        let status = command.borrow().status();
        let executed = if self.continuous {
            match status {
                CommandStatus::Created => self.execute(&command),
                CommandStatus::Executed => true,
                _ => false,
            }
        } else {
            self.with_command(&command, &self.callbacks.then);
            self.execute(&command)
        };

        if executed {
            command.borrow_mut().done();
        }

        self.times_ended.set(self.times_ended.get() + 1);
        self.with_command(&command, &self.callbacks.end);
        self.with_data(&self.callbacks.end_or_cancel);

        let had_effect = command.borrow().had_effect();
        if had_effect {
            self.with_command(&command, &self.callbacks.if_had_effects);
        } else {
            self.with_command(&command, &self.callbacks.if_had_no_effect);
        }

        if executed {
            self.produced.emit(&command);
        }

        let policy = command.borrow().registration_policy();
        match (&self.registry, policy) {
            (_, RegistrationPolicy::None) => {
                command.borrow_mut().flush();
                self.log_command(&command, "Command flushed");
            }
            (Some(registry), policy) => {
                registry.register(command.clone(), policy);
                self.log_command(&command, "Command registered");
            }
            (None, _) => {}
        }

        self.log_usage_end(false);
    }

    fn cancel_command(&self) -> Result<(), FsmError> {
        let held = self.command.borrow_mut().take();
        let Some(command) = held else {
            self.log_usage_end(true);
            return Ok(());
        };

        let status = command.borrow().status();
        if self.continuous && matches!(status, CommandStatus::Executed | CommandStatus::Done) {
            if !command.borrow().is_undoable() {
                command.borrow_mut().cancel();
                let name = command.borrow().name().to_string();
                return Err(FsmError::MustBeUndoable { command: name });
            }
            let undone = command.borrow_mut().undo();
            match undone {
                Ok(()) => self.log_command(&command, "Command undone"),
                Err(err) => self.log_error("Undo on cancel failed", &err),
            }
        }

        command.borrow_mut().cancel();
        self.times_cancelled.set(self.times_cancelled.get() + 1);
        self.with_data(&self.callbacks.cancel);
        self.with_data(&self.callbacks.end_or_cancel);
        self.log_command(&command, "Command cancelled");
        self.log_usage_end(true);
        Ok(())
    }

    fn log_binding(&self, msg: impl FnOnce() -> String) {
        if self.log_levels.contains(&LogLevel::Binding) {
            self.logger.binding_msg(&self.name, &msg());
        }
    }

    fn log_command(&self, command: &Produced<C>, msg: &str) {
        if self.log_levels.contains(&LogLevel::Command) {
            self.logger.command_msg(command.borrow().name(), msg);
        }
    }

    fn log_error(&self, msg: &str, err: &dyn Error) {
        self.logger.binding_error(&self.name, msg, err);
    }

    fn log_usage_start(&self) {
        self.usage_started.set(Some(Utc::now()));
        if self.log_levels.contains(&LogLevel::Usage) {
            self.logger.usage_start(&self.name);
        }
    }

    fn log_usage_end(&self, cancelled: bool) {
        let Some(started) = self.usage_started.take() else {
            return;
        };
        if self.log_levels.contains(&LogLevel::Usage) {
            let elapsed = (Utc::now() - started).num_milliseconds();
            self.logger.usage_end(&self.name, elapsed, cancelled);
        }
    }
}

impl<D: InteractionData, E: 'static, C: Command> FsmHandler for Binding<D, E, C> {
    fn fsm_starts(&self) -> Result<(), FsmError> {
        if !self.is_activated() {
            return Ok(());
        }
        self.log_usage_start();
        if self.when_start() {
            self.create_command();
        } else {
            self.log_binding(|| "Start predicate does not hold".to_string());
        }
        Ok(())
    }

    fn fsm_updates(&self) -> Result<(), FsmError> {
        if !self.is_activated() {
            return Ok(());
        }

        let held = self.command.borrow().clone();
        let Some(command) = held else {
            if self.when_start() {
                self.create_command();
            }
            return Ok(());
        };

        if !self.when_update() {
            return Ok(());
        }
        self.with_command(&command, &self.callbacks.then);
        if self.continuous {
            self.execute(&command);
        }
        Ok(())
    }

    fn fsm_stops(&self) -> Result<(), FsmError> {
        if !self.is_activated() {
            return Ok(());
        }

        let held = self.command.borrow().clone();
        let Some(command) = held else {
            self.log_usage_end(false);
            return Ok(());
        };

        if !self.when_stop() {
            self.log_binding(|| "Stop predicate does not hold; cancelling".to_string());
            return self.cancel_command();
        }

        self.command.borrow_mut().take();
        self.finish(command);
        Ok(())
    }

    fn fsm_cancels(&self) -> Result<(), FsmError> {
        if !self.is_activated() {
            return Ok(());
        }
        self.cancel_command()
    }
}

impl<D: InteractionData, E: 'static, C: Command> fmt::Debug for Binding<D, E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("continuous", &self.continuous)
            .field("activated", &self.activated.get())
            .field("times_ended", &self.times_ended.get())
            .field("times_cancelled", &self.times_cancelled.get())
            .field("command", &self.command_status())
            .finish()
    }
}
