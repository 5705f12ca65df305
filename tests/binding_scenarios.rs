//! End-to-end scenarios: machines, interactions, bindings and undo
//! history working together.

use gestalt::binding::BindingBuilder;
use gestalt::builder::TransitionBuilder;
use gestalt::command::{Command, CommandError, CommandStatus, Undoable, UndoHistory};
use gestalt::core::StateId;
use gestalt::fsm::{ConcurrentFsm, Fsm, FsmError, StopPolicy};
use gestalt::interaction::{Interaction, InteractionData};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pointer {
    Press(i32),
    Move(i32),
    Release,
    Escape,
}

#[derive(Default, Debug)]
struct DragData {
    origin: Option<i32>,
    target: Option<i32>,
}

impl InteractionData for DragData {
    fn reinit_data(&mut self) {
        self.origin = None;
        self.target = None;
    }
}

fn pointer_transition(
    from: StateId,
    to: StateId,
    accept: impl Fn(&Pointer) -> bool + 'static,
    data: &Rc<RefCell<DragData>>,
) -> gestalt::core::Transition<Pointer> {
    let filled = Rc::clone(data);
    TransitionBuilder::new()
        .from(from)
        .to(to)
        .accept(accept)
        .action(move |trigger| {
            let mut data = filled.borrow_mut();
            match trigger.event() {
                Some(Pointer::Press(x)) => data.origin = Some(*x),
                Some(Pointer::Move(x)) => data.target = Some(*x),
                _ => {}
            }
            Ok(())
        })
        .build()
        .unwrap()
}

/// press, move*, release | escape
fn drag_interaction() -> Rc<Interaction<DragData, Pointer>> {
    let data = Rc::new(RefCell::new(DragData::default()));
    let fsm = Fsm::new().named("drag");
    let pressed = fsm.add_standard_state("pressed");
    let dragged = fsm.add_standard_state("dragged");
    let released = fsm.add_terminal_state("released");
    let cancelled = fsm.add_cancelling_state("cancelled");

    let is_press = |p: &Pointer| matches!(p, Pointer::Press(_));
    let is_move = |p: &Pointer| matches!(p, Pointer::Move(_));
    let is_release = |p: &Pointer| *p == Pointer::Release;
    let is_escape = |p: &Pointer| *p == Pointer::Escape;

    for transition in [
        pointer_transition(fsm.initial(), pressed, is_press, &data),
        pointer_transition(pressed, dragged, is_move, &data),
        pointer_transition(dragged, dragged, is_move, &data),
        pointer_transition(pressed, released, is_release, &data),
        pointer_transition(dragged, released, is_release, &data),
        pointer_transition(pressed, cancelled, is_escape, &data),
        pointer_transition(dragged, cancelled, is_escape, &data),
    ] {
        fsm.add_transition(transition).unwrap();
    }

    Interaction::new("drag", fsm, data).unwrap()
}

/// Moves a shape; undoable.
struct MoveShape {
    position: Rc<Cell<i32>>,
    before: i32,
    to: i32,
    undos: Rc<Cell<u32>>,
}

impl Command for MoveShape {
    fn execution(&mut self) -> Result<(), CommandError> {
        self.position.set(self.to);
        Ok(())
    }

    fn create_memento(&mut self) {
        self.before = self.position.get();
    }

    fn as_undoable(&self) -> Option<&dyn Undoable> {
        Some(self)
    }

    fn as_undoable_mut(&mut self) -> Option<&mut dyn Undoable> {
        Some(self)
    }
}

impl Undoable for MoveShape {
    fn undo(&mut self) -> Result<(), CommandError> {
        self.undos.set(self.undos.get() + 1);
        self.position.set(self.before);
        Ok(())
    }

    fn redo(&mut self) -> Result<(), CommandError> {
        self.execution()
    }

    fn undo_name(&self) -> String {
        format!("Move to {}", self.to)
    }
}

/// Leaves a mark; cannot be undone.
struct Stamp {
    marks: Rc<Cell<u32>>,
}

impl Command for Stamp {
    fn execution(&mut self) -> Result<(), CommandError> {
        self.marks.set(self.marks.get() + 1);
        Ok(())
    }
}

fn move_shape(position: &Rc<Cell<i32>>) -> impl Fn(&DragData) -> Result<MoveShape, CommandError> {
    counted_move_shape(position, &Rc::new(Cell::new(0)))
}

fn counted_move_shape(
    position: &Rc<Cell<i32>>,
    undos: &Rc<Cell<u32>>,
) -> impl Fn(&DragData) -> Result<MoveShape, CommandError> {
    let position = Rc::clone(position);
    let undos = Rc::clone(undos);
    move |_| {
        Ok(MoveShape {
            position: Rc::clone(&position),
            before: 0,
            to: 0,
            undos: Rc::clone(&undos),
        })
    }
}

fn feed(interaction: &Interaction<DragData, Pointer>, events: &[Pointer]) {
    for event in events {
        interaction.process_event(event).unwrap();
    }
}

#[test]
fn press_release_completes_one_use() {
    let position = Rc::new(Cell::new(0));
    let interaction = drag_interaction();
    let history = Rc::new(UndoHistory::new(10));
    let binding = BindingBuilder::new(Rc::clone(&interaction))
        .to_produce(move_shape(&position))
        .then(|c: &mut MoveShape, d: &DragData| c.to = d.target.or(d.origin).unwrap_or(0))
        .registry(history.clone())
        .build()
        .unwrap();

    feed(&interaction, &[Pointer::Press(4), Pointer::Release]);

    assert_eq!(binding.times_ended(), 1);
    assert_eq!(binding.times_cancelled(), 0);
    assert_eq!(position.get(), 4);
    assert_eq!(history.len(), 1);
    assert_eq!(history.undo_name(), Some("Move to 4".to_string()));
    assert!(!interaction.is_running());
    assert_eq!(interaction.data().origin, None);
}

#[test]
fn failing_start_condition_produces_nothing() {
    let position = Rc::new(Cell::new(0));
    let interaction = drag_interaction();
    let history = Rc::new(UndoHistory::new(10));
    let binding = BindingBuilder::new(Rc::clone(&interaction))
        .to_produce(move_shape(&position))
        .when_start(|d: &DragData| d.origin.is_some_and(|x| x > 100))
        .registry(history.clone())
        .build()
        .unwrap();
    let produced = Rc::new(Cell::new(0));
    let counter = Rc::clone(&produced);
    binding.produced().subscribe(move |_| counter.set(counter.get() + 1));

    feed(&interaction, &[Pointer::Press(1), Pointer::Release]);

    assert_eq!(produced.get(), 0);
    assert_eq!(binding.times_ended(), 0);
    assert!(history.is_empty());
}

#[test]
fn escape_cancels_a_single_shot_use() {
    let position = Rc::new(Cell::new(7));
    let undos = Rc::new(Cell::new(0));
    let interaction = drag_interaction();
    let outcomes = Rc::new(RefCell::new(Vec::new()));
    let on_cancel = Rc::clone(&outcomes);
    let on_either = Rc::clone(&outcomes);
    let binding = BindingBuilder::new(Rc::clone(&interaction))
        .to_produce(counted_move_shape(&position, &undos))
        .cancel(move |_| on_cancel.borrow_mut().push("cancel"))
        .end_or_cancel(move |_| on_either.borrow_mut().push("end_or_cancel"))
        .build()
        .unwrap();

    feed(&interaction, &[Pointer::Press(1), Pointer::Move(3), Pointer::Escape]);

    assert_eq!(position.get(), 7);
    assert_eq!(undos.get(), 0);
    assert_eq!(binding.times_cancelled(), 1);
    assert_eq!(*outcomes.borrow(), vec!["cancel", "end_or_cancel"]);
    assert_eq!(binding.command_status(), None);
}

#[test]
fn escape_undoes_continuously_executed_move_once() {
    let position = Rc::new(Cell::new(7));
    let undos = Rc::new(Cell::new(0));
    let interaction = drag_interaction();
    let binding = BindingBuilder::new(Rc::clone(&interaction))
        .to_produce(counted_move_shape(&position, &undos))
        .then(|c: &mut MoveShape, d: &DragData| c.to = d.target.unwrap_or(0))
        .continuous_execution(true)
        .build()
        .unwrap();

    feed(&interaction, &[Pointer::Press(1), Pointer::Move(3)]);
    assert_eq!(position.get(), 3);

    interaction.process_event(&Pointer::Escape).unwrap();

    assert_eq!(position.get(), 7);
    assert_eq!(undos.get(), 1);
    assert_eq!(binding.times_cancelled(), 1);
    assert_eq!(binding.times_ended(), 0);
}

#[test]
fn cancelling_executed_command_requires_undo() {
    let marks = Rc::new(Cell::new(0));
    let interaction = drag_interaction();
    let stamps = Rc::clone(&marks);
    let binding = BindingBuilder::new(Rc::clone(&interaction))
        .to_produce(move |_: &DragData| {
            Ok(Stamp {
                marks: Rc::clone(&stamps),
            })
        })
        .continuous_execution(true)
        .build()
        .unwrap();

    interaction.process_event(&Pointer::Press(0)).unwrap();
    interaction.process_event(&Pointer::Move(1)).unwrap();
    assert_eq!(marks.get(), 2);

    let result = interaction.process_event(&Pointer::Escape);

    assert_eq!(
        result,
        Err(FsmError::MustBeUndoable {
            command: "Stamp".to_string()
        })
    );
    assert_eq!(binding.times_cancelled(), 0);
    assert!(!interaction.is_running());
}

#[test]
fn undo_and_redo_through_history() {
    let position = Rc::new(Cell::new(0));
    let interaction = drag_interaction();
    let history = Rc::new(UndoHistory::new(10));
    let _binding = BindingBuilder::new(Rc::clone(&interaction))
        .to_produce(move_shape(&position))
        .then(|c: &mut MoveShape, d: &DragData| c.to = d.target.unwrap_or(0))
        .registry(history.clone())
        .build()
        .unwrap();

    feed(
        &interaction,
        &[Pointer::Press(0), Pointer::Move(5), Pointer::Release],
    );
    feed(
        &interaction,
        &[Pointer::Press(5), Pointer::Move(9), Pointer::Release],
    );
    assert_eq!(position.get(), 9);
    assert_eq!(history.len(), 2);

    assert!(history.undo().unwrap());
    assert_eq!(position.get(), 5);
    assert!(history.undo().unwrap());
    assert_eq!(position.get(), 0);
    assert!(!history.undo().unwrap());

    assert!(history.redo().unwrap());
    assert_eq!(position.get(), 5);
    assert_eq!(history.redo_name(), Some("Move to 9".to_string()));

    let records = history.records();
    assert!(records.iter().all(|r| r.status == CommandStatus::Done));
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Touch {
    Start(u64),
    Move(u64),
    End(u64),
}

impl Touch {
    fn finger(&self) -> u64 {
        match self {
            Self::Start(id) | Self::Move(id) | Self::End(id) => *id,
        }
    }
}

fn finger() -> Fsm<Touch> {
    let fsm = Fsm::new().named("finger");
    let touching = fsm.add_standard_state("touching");
    let lifted = fsm.add_terminal_state("lifted");
    let on = |from: StateId, to: StateId, accept: fn(&Touch) -> bool| {
        TransitionBuilder::new()
            .from(from)
            .to(to)
            .accept(accept)
            .build()
            .unwrap()
    };
    fsm.add_transition(on(fsm.initial(), touching, |t| matches!(t, Touch::Start(_))))
        .unwrap();
    fsm.add_transition(on(touching, touching, |t| matches!(t, Touch::Move(_))))
        .unwrap();
    fsm.add_transition(on(touching, lifted, |t| matches!(t, Touch::End(_))))
        .unwrap();
    fsm
}

#[test]
fn two_finger_touch_is_one_use() {
    let machine =
        ConcurrentFsm::correlated(vec![finger(), finger()], StopPolicy::FirstTerminal, |t: &Touch| {
            Some(t.finger())
        })
        .unwrap();
    let interaction = Interaction::new("pinch", machine, Rc::new(RefCell::new(()))).unwrap();
    let marks = Rc::new(Cell::new(0));
    let stamps = Rc::clone(&marks);
    let starts = Rc::new(Cell::new(0));
    let started = Rc::clone(&starts);
    let binding = BindingBuilder::new(Rc::clone(&interaction))
        .to_produce(move |_: &()| {
            Ok(Stamp {
                marks: Rc::clone(&stamps),
            })
        })
        .first(move |_, _| started.set(started.get() + 1))
        .build()
        .unwrap();

    feed_touch(&interaction, Touch::Start(1));
    assert_eq!(starts.get(), 0);
    feed_touch(&interaction, Touch::Start(2));
    assert_eq!(starts.get(), 1);
    assert!(interaction.is_running());

    feed_touch(&interaction, Touch::Move(1));
    feed_touch(&interaction, Touch::Move(2));
    feed_touch(&interaction, Touch::End(1));
    feed_touch(&interaction, Touch::End(2));

    assert_eq!(starts.get(), 1);
    assert_eq!(binding.times_ended(), 1);
    assert_eq!(marks.get(), 1);
    assert!(!interaction.is_running());
}

fn feed_touch(interaction: &Interaction<(), Touch>, touch: Touch) {
    interaction.process_event(&touch).unwrap();
}

#[test]
fn deactivated_interaction_ignores_events() {
    let position = Rc::new(Cell::new(0));
    let interaction = drag_interaction();
    let binding = BindingBuilder::new(Rc::clone(&interaction))
        .to_produce(move_shape(&position))
        .build()
        .unwrap();

    binding.set_activated(false);
    feed(&interaction, &[Pointer::Press(2), Pointer::Release]);
    binding.set_activated(true);
    feed(&interaction, &[Pointer::Press(2), Pointer::Release]);

    assert_eq!(binding.times_ended(), 1);
}
