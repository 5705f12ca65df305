//! User interactions: a recognizing machine plus the payload it fills.

use crate::builder::BuildError;
use crate::fsm::{DataHandler, FsmError, StateMachine};
use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::{Rc, Weak};
use stillwater::validation::Validation;

/// Payload an interaction exposes to its bindings.
pub trait InteractionData: 'static {
    /// Reset to the empty payload.
    fn reinit_data(&mut self);
}

impl InteractionData for () {
    fn reinit_data(&mut self) {}
}

/// Host-side listener registry, such as a widget's event subscriptions.
pub trait EventRegistrar {
    fn listen(&self, kind: &str);

    fn unlisten(&self, kind: &str);
}

struct DataReset<D> {
    data: Rc<RefCell<D>>,
}

impl<D: InteractionData> DataHandler for DataReset<D> {
    fn reinit_data(&self) {
        if let Ok(mut data) = self.data.try_borrow_mut() {
            data.reinit_data();
        }
    }
}

/// One registrar and the event kinds currently listened to on it.
struct Registration {
    registrar: Rc<dyn EventRegistrar>,
    listened: RefCell<BTreeSet<String>>,
    active: Cell<bool>,
}

impl Registration {
    fn sync(&self, wanted: BTreeSet<String>) {
        if !self.active.get() {
            return;
        }
        let (stale, fresh) = {
            let listened = self.listened.borrow();
            let stale: Vec<String> = listened.difference(&wanted).cloned().collect();
            let fresh: Vec<String> = wanted.difference(&listened).cloned().collect();
            (stale, fresh)
        };
        for kind in &stale {
            self.registrar.unlisten(kind);
        }
        for kind in &fresh {
            self.registrar.listen(kind);
        }
        *self.listened.borrow_mut() = wanted;
    }

    fn release(&self) {
        self.active.set(false);
        let listened = std::mem::take(&mut *self.listened.borrow_mut());
        for kind in &listened {
            self.registrar.unlisten(kind);
        }
    }
}

/// A user interaction: a validated machine and the data it produces.
///
/// The machine's transition actions fill the shared payload; the payload
/// is reset when the machine terminates or cancels, after handlers have
/// been notified.
pub struct Interaction<D: InteractionData, E: 'static> {
    name: String,
    machine: Rc<dyn StateMachine<E>>,
    data: Rc<RefCell<D>>,
    data_reset: Rc<DataReset<D>>,
    activated: Cell<bool>,
    registrations: RefCell<Vec<Rc<Registration>>>,
}

impl<D: InteractionData, E: 'static> Interaction<D, E> {
    /// Wrap `machine`, rejecting it if its graph is invalid.
    pub fn new<M>(
        name: impl Into<String>,
        machine: M,
        data: Rc<RefCell<D>>,
    ) -> Result<Rc<Self>, BuildError>
    where
        M: StateMachine<E> + 'static,
    {
        if let Validation::Failure(errors) = machine.validate() {
            return Err(BuildError::InvalidMachine(errors.iter().cloned().collect()));
        }

        let data_reset = Rc::new(DataReset {
            data: Rc::clone(&data),
        });
        let handler: Weak<DataReset<D>> = Rc::downgrade(&data_reset);
        machine.set_data_handler(handler);

        Ok(Rc::new(Self {
            name: name.into(),
            machine: Rc::new(machine),
            data,
            data_reset,
            activated: Cell::new(true),
            registrations: RefCell::new(Vec::new()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn machine(&self) -> &Rc<dyn StateMachine<E>> {
        &self.machine
    }

    pub fn is_activated(&self) -> bool {
        self.activated.get()
    }

    /// Deactivating also resets the machine and the payload.
    pub fn set_activated(&self, activated: bool) {
        self.activated.set(activated);
        if !activated {
            self.machine.full_reinit();
        }
    }

    pub fn is_running(&self) -> bool {
        self.activated.get() && self.machine.is_started()
    }

    /// Feed one event to the machine. Ignored while deactivated.
    pub fn process_event(&self, event: &E) -> Result<bool, FsmError> {
        if !self.activated.get() {
            return Ok(false);
        }
        self.machine.process(event)
    }

    pub fn data(&self) -> Ref<'_, D> {
        self.data.borrow()
    }

    /// The shared payload, for transition actions to fill.
    pub fn data_cell(&self) -> Rc<RefCell<D>> {
        Rc::clone(&self.data)
    }

    pub fn reinit_data(&self) {
        self.data_reset.reinit_data();
    }

    pub fn full_reinit(&self) {
        self.machine.full_reinit();
    }

    pub fn set_log(&self, log: bool) {
        self.machine.set_log(log);
    }

    pub fn accepted_events(&self) -> BTreeSet<String> {
        self.machine.accepted_events()
    }

    /// Keep `registrar` listening to exactly the event kinds the machine
    /// can consume from its current state.
    pub fn register_to_nodes(&self, registrar: Rc<dyn EventRegistrar>) {
        let registration = Rc::new(Registration {
            registrar,
            listened: RefCell::new(BTreeSet::new()),
            active: Cell::new(true),
        });
        registration.sync(self.machine.accepted_events());

        let machine = Rc::downgrade(&self.machine);
        let observed = Rc::downgrade(&registration);
        self.machine.observe_state(Rc::new(move || {
            let (Some(machine), Some(registration)) = (machine.upgrade(), observed.upgrade()) else {
                return;
            };
            registration.sync(machine.accepted_events());
        }));

        self.registrations.borrow_mut().push(registration);
    }

    /// Stop listening on `registrar`. Returns whether it was registered.
    pub fn unregister_from_nodes(&self, registrar: &Rc<dyn EventRegistrar>) -> bool {
        let removed: Vec<Rc<Registration>> = {
            let mut registrations = self.registrations.borrow_mut();
            let (removed, kept) = registrations
                .drain(..)
                .partition(|r| Rc::ptr_eq(&r.registrar, registrar));
            *registrations = kept;
            removed
        };
        for registration in &removed {
            registration.release();
        }
        !removed.is_empty()
    }

    /// Deactivate, release every registrar and detach the machine.
    pub fn uninstall(&self) {
        self.activated.set(false);
        let registrations = std::mem::take(&mut *self.registrations.borrow_mut());
        for registration in &registrations {
            registration.release();
        }
        self.machine.uninstall();
    }
}

impl<D: InteractionData, E: 'static> fmt::Debug for Interaction<D, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interaction")
            .field("name", &self.name)
            .field("activated", &self.activated.get())
            .field("running", &self.is_running())
            .field("registrations", &self.registrations.borrow().len())
            .finish()
    }
}
