//! Gestalt: user gestures as state machines, bound to undoable commands
//!
//! Gestalt recognizes user interactions (press/drag/release, double clicks,
//! multi-touch) with small finite-state machines, and turns each recognized
//! use into an application command that can be undone.
//!
//! # Core Concepts
//!
//! - **Machine**: [`Fsm`] processes events, fires timeouts and notifies its
//!   handlers when an interaction starts, updates, stops or is cancelled
//! - **Interaction**: an [`Interaction`] pairs a validated machine with the
//!   data its transition actions fill
//! - **Binding**: a [`Binding`] creates a command when its interaction
//!   starts and executes it when the interaction stops
//! - **History**: [`UndoHistory`] retains finished commands and undoes them
//!
//! # Example
//!
//! ```rust
//! use gestalt::builder::TransitionBuilder;
//! use gestalt::command::{Command, CommandError, Undoable, UndoHistory};
//! use gestalt::fsm::Fsm;
//! use gestalt::interaction::{Interaction, InteractionData};
//! use gestalt::binding::BindingBuilder;
//! use std::cell::{Cell, RefCell};
//! use std::rc::Rc;
//!
//! #[derive(Clone, Copy, PartialEq)]
//! enum Mouse {
//!     Down,
//!     Up,
//! }
//!
//! #[derive(Default)]
//! struct Click {
//!     pressed: bool,
//! }
//!
//! impl InteractionData for Click {
//!     fn reinit_data(&mut self) {
//!         self.pressed = false;
//!     }
//! }
//!
//! struct Toggle {
//!     light: Rc<Cell<bool>>,
//! }
//!
//! impl Command for Toggle {
//!     fn execution(&mut self) -> Result<(), CommandError> {
//!         self.light.set(!self.light.get());
//!         Ok(())
//!     }
//!
//!     fn as_undoable(&self) -> Option<&dyn Undoable> {
//!         Some(self)
//!     }
//!
//!     fn as_undoable_mut(&mut self) -> Option<&mut dyn Undoable> {
//!         Some(self)
//!     }
//! }
//!
//! impl Undoable for Toggle {
//!     fn undo(&mut self) -> Result<(), CommandError> {
//!         self.execution()
//!     }
//!
//!     fn redo(&mut self) -> Result<(), CommandError> {
//!         self.execution()
//!     }
//!
//!     fn undo_name(&self) -> String {
//!         "Toggle light".to_string()
//!     }
//! }
//!
//! let data = Rc::new(RefCell::new(Click::default()));
//! let fsm = Fsm::new().named("click");
//! let pressed = fsm.add_standard_state("pressed");
//! let clicked = fsm.add_terminal_state("clicked");
//! let marked = Rc::clone(&data);
//! fsm.add_transition(
//!     TransitionBuilder::new()
//!         .from(fsm.initial())
//!         .to(pressed)
//!         .on(&["mousedown"], |m: &Mouse| *m == Mouse::Down)
//!         .action(move |_| {
//!             marked.borrow_mut().pressed = true;
//!             Ok(())
//!         })
//!         .build()
//!         .unwrap(),
//! )
//! .unwrap();
//! fsm.add_transition(
//!     TransitionBuilder::new()
//!         .from(pressed)
//!         .to(clicked)
//!         .on(&["mouseup"], |m: &Mouse| *m == Mouse::Up)
//!         .build()
//!         .unwrap(),
//! )
//! .unwrap();
//! let click = Interaction::new("click", fsm, data).unwrap();
//!
//! let light = Rc::new(Cell::new(false));
//! let history = Rc::new(UndoHistory::new(20));
//! let switch = Rc::clone(&light);
//! let _binding = BindingBuilder::new(Rc::clone(&click))
//!     .to_produce(move |_: &Click| Ok(Toggle { light: Rc::clone(&switch) }))
//!     .when_stop(|d: &Click| d.pressed)
//!     .registry(history.clone())
//!     .build()
//!     .unwrap();
//!
//! click.process_event(&Mouse::Down).unwrap();
//! click.process_event(&Mouse::Up).unwrap();
//! assert!(light.get());
//!
//! history.undo().unwrap();
//! assert!(!light.get());
//! assert_eq!(history.redo_name(), Some("Toggle light".to_string()));
//! ```

pub mod binding;
pub mod builder;
pub mod command;
pub mod core;
pub mod fsm;
pub mod interaction;
pub mod logging;

// Re-export commonly used types
pub use binding::{Binding, BindingBuilder, BindingOptions};
pub use builder::{BuildError, TransitionBuilder};
pub use command::{Command, CommandError, CommandStatus, RegistrationPolicy, UndoHistory, Undoable};
pub use crate::core::{StateId, StateKind, Trigger, VirtualClock};
pub use fsm::{ConcurrentFsm, Fsm, FsmError, FsmHandler, StateMachine, StopPolicy};
pub use interaction::{Interaction, InteractionData};
pub use logging::{LogLevel, Logger, TracingLogger};
