//! Fluent construction of bindings.

use super::{Binding, BindingOptions, Callbacks, Factory, Stream};
use crate::builder::BuildError;
use crate::command::{Command, CommandError, CommandRegistry};
use crate::interaction::{Interaction, InteractionData};
use crate::logging::{LogLevel, Logger, TracingLogger};
use chrono::Utc;
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};
use uuid::Uuid;

/// Builder for [`Binding`].
///
/// Only the command factory is required:
///
/// ```rust
/// use gestalt::binding::BindingBuilder;
/// use gestalt::builder::TransitionBuilder;
/// use gestalt::command::{Command, CommandError};
/// use gestalt::fsm::Fsm;
/// use gestalt::interaction::Interaction;
/// use std::cell::{Cell, RefCell};
/// use std::rc::Rc;
///
/// struct Beep(Rc<Cell<u32>>);
///
/// impl Command for Beep {
///     fn execution(&mut self) -> Result<(), CommandError> {
///         self.0.set(self.0.get() + 1);
///         Ok(())
///     }
/// }
///
/// let fsm = Fsm::new();
/// let pressed = fsm.add_terminal_state("pressed");
/// fsm.add_transition(
///     TransitionBuilder::new()
///         .from(fsm.initial())
///         .to(pressed)
///         .on(&["keydown"], |key: &char| *key == ' ')
///         .build()
///         .unwrap(),
/// )
/// .unwrap();
/// let interaction = Interaction::new("space", fsm, Rc::new(RefCell::new(()))).unwrap();
///
/// let beeps = Rc::new(Cell::new(0));
/// let counter = Rc::clone(&beeps);
/// let binding = BindingBuilder::new(Rc::clone(&interaction))
///     .name("beep")
///     .to_produce(move |_: &()| Ok(Beep(Rc::clone(&counter))))
///     .build()
///     .unwrap();
///
/// interaction.process_event(&' ').unwrap();
/// assert_eq!(beeps.get(), 1);
/// assert_eq!(binding.times_ended(), 1);
/// ```
pub struct BindingBuilder<D: InteractionData, E: 'static, C: Command> {
    interaction: Rc<Interaction<D, E>>,
    name: Option<String>,
    factory: Option<Factory<D, C>>,
    callbacks: Callbacks<D, C>,
    continuous: bool,
    registry: Option<Rc<dyn CommandRegistry>>,
    logger: Option<Rc<dyn Logger>>,
    log_levels: BTreeSet<LogLevel>,
}

impl<D: InteractionData, E: 'static, C: Command> BindingBuilder<D, E, C> {
    pub fn new(interaction: Rc<Interaction<D, E>>) -> Self {
        Self {
            interaction,
            name: None,
            factory: None,
            callbacks: Callbacks::default(),
            continuous: false,
            registry: None,
            logger: None,
            log_levels: BTreeSet::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Factory invoked at the start of each use.
    pub fn to_produce<F>(mut self, factory: F) -> Self
    where
        F: Fn(&D) -> Result<C, CommandError> + 'static,
    {
        self.factory = Some(Box::new(factory));
        self
    }

    /// Runs once, right after the command is created.
    pub fn first<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut C, &D) + 'static,
    {
        self.callbacks.first = Some(Box::new(callback));
        self
    }

    /// Runs on every update, and once more before a single-shot execution.
    pub fn then<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut C, &D) + 'static,
    {
        self.callbacks.then = Some(Box::new(callback));
        self
    }

    pub fn end<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut C, &D) + 'static,
    {
        self.callbacks.end = Some(Box::new(callback));
        self
    }

    pub fn cancel<F>(mut self, callback: F) -> Self
    where
        F: Fn(&D) + 'static,
    {
        self.callbacks.cancel = Some(Box::new(callback));
        self
    }

    pub fn end_or_cancel<F>(mut self, callback: F) -> Self
    where
        F: Fn(&D) + 'static,
    {
        self.callbacks.end_or_cancel = Some(Box::new(callback));
        self
    }

    /// Condition checked together with each of the stage conditions.
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&D) -> bool + 'static,
    {
        self.callbacks.when = Some(Box::new(predicate));
        self
    }

    pub fn when_start<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&D) -> bool + 'static,
    {
        self.callbacks.when_start = Some(Box::new(predicate));
        self
    }

    pub fn when_update<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&D) -> bool + 'static,
    {
        self.callbacks.when_update = Some(Box::new(predicate));
        self
    }

    /// When false at the end of a use, the use is cancelled instead.
    pub fn when_stop<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&D) -> bool + 'static,
    {
        self.callbacks.when_stop = Some(Box::new(predicate));
        self
    }

    pub fn if_cannot_execute<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut C, &D) + 'static,
    {
        self.callbacks.if_cannot_execute = Some(Box::new(callback));
        self
    }

    pub fn if_had_effects<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut C, &D) + 'static,
    {
        self.callbacks.if_had_effects = Some(Box::new(callback));
        self
    }

    pub fn if_had_no_effect<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut C, &D) + 'static,
    {
        self.callbacks.if_had_no_effect = Some(Box::new(callback));
        self
    }

    pub fn continuous_execution(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    /// Registry receiving the commands of completed uses.
    pub fn registry(mut self, registry: Rc<dyn CommandRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn logger(mut self, logger: Rc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn log(mut self, level: LogLevel) -> Self {
        self.log_levels.insert(level);
        self
    }

    /// Apply loaded options. Values set here override earlier setters.
    pub fn options(mut self, options: BindingOptions) -> Self {
        if let Some(name) = options.name {
            self.name = Some(name);
        }
        self.continuous = options.continuous_execution;
        self.log_levels.extend(options.logging);
        self
    }

    /// Create the binding and attach it to the interaction's machine.
    pub fn build(self) -> Result<Rc<Binding<D, E, C>>, BuildError> {
        let factory = self.factory.ok_or(BuildError::MissingCommandFactory)?;

        if self.log_levels.contains(&LogLevel::Interaction) {
            self.interaction.set_log(true);
        }

        let name = self
            .name
            .unwrap_or_else(|| format!("{}-binding", self.interaction.name()));
        let logger = self.logger.unwrap_or_else(|| Rc::new(TracingLogger));

        let binding = Rc::new(Binding {
            id: Uuid::new_v4(),
            name,
            created_at: Utc::now(),
            interaction: self.interaction,
            factory,
            callbacks: self.callbacks,
            continuous: self.continuous,
            registry: self.registry,
            logger,
            log_levels: self.log_levels,
            command: RefCell::new(None),
            times_ended: Cell::new(0),
            times_cancelled: Cell::new(0),
            activated: Cell::new(true),
            handler_id: Cell::new(None),
            usage_started: Cell::new(None),
            produced: Stream::new(),
        });

        let handler: Weak<Binding<D, E, C>> = Rc::downgrade(&binding);
        let id = binding.interaction.machine().add_handler(handler);
        binding.set_handler_id(id);
        Ok(binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TransitionBuilder;
    use crate::command::{CommandStatus, RegistrationPolicy, SharedCommand};
    use crate::fsm::Fsm;

    struct Noop;

    impl Command for Noop {
        fn execution(&mut self) -> Result<(), CommandError> {
            Ok(())
        }

        fn registration_policy(&self, _: bool) -> RegistrationPolicy {
            RegistrationPolicy::Unlimited
        }
    }

    #[derive(Default)]
    struct Recording {
        policies: RefCell<Vec<RegistrationPolicy>>,
    }

    impl CommandRegistry for Recording {
        fn register(&self, command: SharedCommand, policy: RegistrationPolicy) {
            assert_eq!(command.borrow().status(), CommandStatus::Done);
            self.policies.borrow_mut().push(policy);
        }
    }

    fn key_press() -> Rc<Interaction<(), u8>> {
        let fsm = Fsm::new().named("key");
        let pressed = fsm.add_terminal_state("pressed");
        fsm.add_transition(
            TransitionBuilder::new()
                .from(fsm.initial())
                .to(pressed)
                .on(&["keydown"], |_: &u8| true)
                .build()
                .unwrap(),
        )
        .unwrap();
        Interaction::new("key", fsm, Rc::new(RefCell::new(()))).unwrap()
    }

    #[test]
    fn factory_is_required() {
        let result: Result<Rc<Binding<(), u8, Noop>>, _> =
            BindingBuilder::new(key_press()).build();
        assert!(matches!(result, Err(BuildError::MissingCommandFactory)));
    }

    #[test]
    fn default_name_derives_from_interaction() {
        let binding = BindingBuilder::new(key_press())
            .to_produce(|_: &()| Ok(Noop))
            .build()
            .unwrap();
        assert_eq!(binding.name(), "key-binding");
        assert!(binding.is_activated());
    }

    #[test]
    fn options_override_setters() {
        let options = BindingOptions::from_json(
            r#"{ "name": "typing", "continuous_execution": true, "logging": ["command"] }"#,
        )
        .unwrap();
        let binding = BindingBuilder::new(key_press())
            .name("ignored")
            .to_produce(|_: &()| Ok(Noop))
            .options(options)
            .build()
            .unwrap();

        assert_eq!(binding.name(), "typing");
        assert!(binding.is_continuous());
    }

    #[test]
    fn completed_commands_reach_the_registry() {
        let interaction = key_press();
        let registry = Rc::new(Recording::default());
        let _binding = BindingBuilder::new(Rc::clone(&interaction))
            .to_produce(|_: &()| Ok(Noop))
            .registry(registry.clone())
            .build()
            .unwrap();

        interaction.process_event(&1).unwrap();
        interaction.process_event(&2).unwrap();

        assert_eq!(
            *registry.policies.borrow(),
            vec![RegistrationPolicy::Unlimited, RegistrationPolicy::Unlimited]
        );
    }

    #[test]
    fn dropping_the_binding_detaches_it() {
        let interaction = key_press();
        let registry = Rc::new(Recording::default());
        let binding = BindingBuilder::new(Rc::clone(&interaction))
            .to_produce(|_: &()| Ok(Noop))
            .registry(registry.clone())
            .build()
            .unwrap();

        drop(binding);
        interaction.process_event(&1).unwrap();

        assert!(registry.policies.borrow().is_empty());
    }
}
