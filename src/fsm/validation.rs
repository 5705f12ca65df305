//! Structural checks on a machine graph.
//!
//! Uses Stillwater's `Validation` so that every problem in a graph is
//! reported at once instead of one per build attempt.

use super::machine::Fsm;
use crate::core::{StateId, StateKind};
use std::collections::{BTreeSet, VecDeque};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// A structural problem found by [`Fsm::validate`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FsmViolation {
    #[error("No transition leaves the initial state")]
    NoInitialTransition,

    #[error("State '{name}' cannot be reached from the initial state")]
    UnreachableState { name: String },

    #[error("Standard state '{name}' has no outgoing transition")]
    DeadEndState { name: String },

    #[error("No terminal or cancelling state is reachable")]
    NoReachableExit,
}

impl<E: 'static> Fsm<E> {
    /// Check the graph, accumulating all violations.
    pub fn validate(&self) -> Validation<(), NonEmptyVec<FsmViolation>> {
        let states = self.states();
        let edges = self.edges();
        let reachable = reachable_from(StateId::INITIAL, &edges);

        let mut checks: Vec<Validation<(), NonEmptyVec<FsmViolation>>> = Vec::new();

        let check = if edges.iter().any(|(src, _)| *src == StateId::INITIAL) {
            Validation::success(())
        } else {
            Validation::fail(FsmViolation::NoInitialTransition)
        };
        checks.push(check);

        for (index, state) in states.iter().enumerate() {
            let id = StateId(index);
            if !reachable.contains(&id) {
                checks.push(Validation::fail(FsmViolation::UnreachableState {
                    name: state.name().to_string(),
                }));
            } else if state.kind() == StateKind::Standard
                && !edges.iter().any(|(src, _)| *src == id)
            {
                checks.push(Validation::fail(FsmViolation::DeadEndState {
                    name: state.name().to_string(),
                }));
            }
        }

        // Every machine with transitions needs a reachable exit state. With
        // no transitions at all only NoInitialTransition is reported.
        let has_exit = states
            .iter()
            .enumerate()
            .any(|(index, s)| s.kind().is_exit() && reachable.contains(&StateId(index)));
        let check = if has_exit || edges.is_empty() {
            Validation::success(())
        } else {
            Validation::fail(FsmViolation::NoReachableExit)
        };
        checks.push(check);

        Validation::all_vec(checks).map(|_| ())
    }
}

fn reachable_from(start: StateId, edges: &[(StateId, StateId)]) -> BTreeSet<StateId> {
    let mut seen = BTreeSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(state) = queue.pop_front() {
        for (_, tgt) in edges.iter().filter(|(src, _)| *src == state) {
            if seen.insert(*tgt) {
                queue.push_back(*tgt);
            }
        }
    }
    seen
}
