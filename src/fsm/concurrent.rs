//! Logical composition of several machines advancing side by side.

use super::error::FsmError;
use super::handler::{DataHandler, FsmHandler, HandlerId, Notification, Notifier};
use super::machine::Fsm;
use super::validation::FsmViolation;
use crate::builder::BuildError;
use crate::logging::{Logger, TracingLogger};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::{Rc, Weak};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// When a concurrent machine as a whole stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopPolicy {
    /// Stop as soon as any member reaches a terminal state.
    #[default]
    FirstTerminal,
    /// Stop once every member has reached a terminal state.
    AllTerminal,
}

/// Extracts the correlation key of an event, such as a touch identifier.
pub type CorrelationKey<E> = Rc<dyn Fn(&E) -> Option<u64>>;

struct ConcurrentInner<E: 'static> {
    members: Vec<Fsm<E>>,
    bridges: Vec<Rc<MemberBridge<E>>>,
    bound: RefCell<Vec<Option<u64>>>,
    finished: RefCell<Vec<bool>>,
    started: Cell<bool>,
    policy: StopPolicy,
    key: Option<CorrelationKey<E>>,
    notifier: Notifier,
    data_handler: RefCell<Option<Weak<dyn DataHandler>>>,
    log: Cell<bool>,
    logger: Rc<dyn Logger>,
}

/// N ≥ 2 member machines tracked as one unit.
///
/// The aggregate starts once every member has started, relays member
/// updates and cancellations, and stops according to its [`StopPolicy`].
/// Member handlers registered before composition keep receiving their
/// member's notifications.
pub struct ConcurrentFsm<E: 'static> {
    inner: Rc<ConcurrentInner<E>>,
}

impl<E: 'static> Clone for ConcurrentFsm<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: 'static> ConcurrentFsm<E> {
    /// Compose `members`; each event goes to the first member that takes it.
    pub fn new(members: Vec<Fsm<E>>, policy: StopPolicy) -> Result<Self, BuildError> {
        Self::build(members, policy, None)
    }

    /// Compose `members`, routing events that carry a correlation key to
    /// the member already bound to that key.
    pub fn correlated(
        members: Vec<Fsm<E>>,
        policy: StopPolicy,
        key: impl Fn(&E) -> Option<u64> + 'static,
    ) -> Result<Self, BuildError> {
        Self::build(members, policy, Some(Rc::new(key)))
    }

    fn build(
        members: Vec<Fsm<E>>,
        policy: StopPolicy,
        key: Option<CorrelationKey<E>>,
    ) -> Result<Self, BuildError> {
        if members.len() < 2 {
            return Err(BuildError::NotEnoughMembers {
                found: members.len(),
            });
        }

        let count = members.len();
        let inner = Rc::new_cyclic(|parent: &Weak<ConcurrentInner<E>>| ConcurrentInner {
            members,
            bridges: (0..count)
                .map(|index| {
                    Rc::new(MemberBridge {
                        parent: parent.clone(),
                        index,
                    })
                })
                .collect(),
            bound: RefCell::new(vec![None; count]),
            finished: RefCell::new(vec![false; count]),
            started: Cell::new(false),
            policy,
            key,
            notifier: Notifier::default(),
            data_handler: RefCell::new(None),
            log: Cell::new(false),
            logger: Rc::new(TracingLogger),
        });

        for (member, bridge) in inner.members.iter().zip(&inner.bridges) {
            let handler: Weak<MemberBridge<E>> = Rc::downgrade(bridge);
            member.add_handler(handler);
        }

        Ok(Self { inner })
    }

    pub fn members(&self) -> &[Fsm<E>] {
        &self.inner.members
    }

    pub fn policy(&self) -> StopPolicy {
        self.inner.policy
    }

    /// True only while every member is started.
    pub fn is_started(&self) -> bool {
        self.inner.members.iter().all(Fsm::is_started)
    }

    /// The correlation key a member is bound to, if any.
    pub fn bound_key(&self, member: usize) -> Option<u64> {
        self.inner.bound.borrow().get(member).copied().flatten()
    }

    pub fn process(&self, event: &E) -> Result<bool, FsmError> {
        let key = self.inner.key.as_ref().and_then(|key| key(event));
        match key {
            Some(key) => self.process_keyed(key, event),
            None => self.process_any(event),
        }
    }

    fn process_any(&self, event: &E) -> Result<bool, FsmError> {
        for member in &self.inner.members {
            if member.process(event)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn process_keyed(&self, key: u64, event: &E) -> Result<bool, FsmError> {
        let bound = self
            .inner
            .bound
            .borrow()
            .iter()
            .position(|b| *b == Some(key));
        if let Some(index) = bound {
            return match self.inner.members.get(index) {
                Some(member) => member.process(event),
                None => Ok(false),
            };
        }

        for (index, member) in self.inner.members.iter().enumerate() {
            if self.bound_key(index).is_some() {
                continue;
            }
            if member.process(event)? {
                if member.is_started() {
                    if let Some(slot) = self.inner.bound.borrow_mut().get_mut(index) {
                        *slot = Some(key);
                    }
                }
                self.log_msg(|| format!("Member {index} bound to key {key}"));
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn add_handler(&self, handler: Weak<dyn FsmHandler>) -> HandlerId {
        self.inner.notifier.add(handler)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.inner.notifier.remove(id)
    }

    pub fn set_data_handler(&self, handler: Weak<dyn DataHandler>) {
        *self.inner.data_handler.borrow_mut() = Some(handler);
    }

    pub fn set_log(&self, log: bool) {
        self.inner.log.set(log);
        for member in &self.inner.members {
            member.set_log(log);
        }
    }

    /// Event kinds any member can consume next.
    pub fn accepted_events(&self) -> BTreeSet<String> {
        self.inner
            .members
            .iter()
            .flat_map(Fsm::accepted_events)
            .collect()
    }

    pub fn observe_state(&self, observer: Rc<dyn Fn()>) {
        for member in &self.inner.members {
            member.observe_state(Rc::clone(&observer));
        }
    }

    /// Validate every member, accumulating all violations.
    pub fn validate(&self) -> Validation<(), NonEmptyVec<FsmViolation>> {
        let checks: Vec<Validation<(), NonEmptyVec<FsmViolation>>> =
            self.inner.members.iter().map(Fsm::validate).collect();
        Validation::all_vec(checks).map(|_| ())
    }

    pub fn reinit(&self) {
        self.inner.reset();
    }

    pub fn full_reinit(&self) {
        self.inner.reset();
        self.inner.reinit_data();
        for member in &self.inner.members {
            member.full_reinit();
        }
    }

    pub fn uninstall(&self) {
        self.inner.reset();
        self.inner.notifier.clear();
        *self.inner.data_handler.borrow_mut() = None;
        for member in &self.inner.members {
            member.uninstall();
        }
    }

    fn log_msg(&self, msg: impl FnOnce() -> String) {
        self.inner.log_msg(msg);
    }
}

impl<E: 'static> ConcurrentInner<E> {
    fn all_members_started(&self) -> bool {
        self.members.iter().all(Fsm::is_started)
    }

    fn member_started(&self, index: usize) -> Result<(), FsmError> {
        if let Some(flag) = self.finished.borrow_mut().get_mut(index) {
            *flag = false;
        }
        if self.started.get() || !self.all_members_started() {
            return Ok(());
        }
        self.started.set(true);
        self.log_msg(|| "All members started".to_string());
        self.notifier.notify(Notification::Starts)
    }

    fn member_updated(&self) -> Result<(), FsmError> {
        if !self.started.get() {
            return Ok(());
        }
        self.notifier.notify(Notification::Updates)
    }

    fn member_stopped(&self, index: usize) -> Result<(), FsmError> {
        if let Some(slot) = self.bound.borrow_mut().get_mut(index) {
            *slot = None;
        }
        if let Some(flag) = self.finished.borrow_mut().get_mut(index) {
            *flag = true;
        }

        let done = match self.policy {
            StopPolicy::FirstTerminal => true,
            StopPolicy::AllTerminal => self.finished.borrow().iter().all(|f| *f),
        };
        if !done || !self.started.get() {
            return Ok(());
        }

        self.log_msg(|| "Stopping".to_string());
        let result = self.notifier.notify(Notification::Stops);
        // The vetoing member turns this into a cancellation of its own.
        if result == Err(FsmError::Cancelled) {
            return result;
        }
        self.reinit_data();
        self.reset();
        result
    }

    fn member_cancelled(&self, index: usize) -> Result<(), FsmError> {
        if let Some(slot) = self.bound.borrow_mut().get_mut(index) {
            *slot = None;
        }
        if !self.started.get() {
            return Ok(());
        }

        self.log_msg(|| "Cancelling".to_string());
        let result = self.notifier.notify(Notification::Cancels);
        self.reinit_data();
        self.reset();
        result
    }

    fn reset(&self) {
        self.started.set(false);
        self.bound.borrow_mut().iter_mut().for_each(|b| *b = None);
        self.finished.borrow_mut().iter_mut().for_each(|f| *f = false);
        for member in &self.members {
            member.reinit();
        }
    }

    fn reinit_data(&self) {
        let handler = self.data_handler.borrow().as_ref().and_then(Weak::upgrade);
        if let Some(handler) = handler {
            handler.reinit_data();
        }
    }

    fn log_msg(&self, msg: impl FnOnce() -> String) {
        if self.log.get() {
            self.logger.interaction_msg("concurrent", &msg());
        }
    }
}

/// Private handler attached to each member.
struct MemberBridge<E: 'static> {
    parent: Weak<ConcurrentInner<E>>,
    index: usize,
}

impl<E: 'static> FsmHandler for MemberBridge<E> {
    fn fsm_starts(&self) -> Result<(), FsmError> {
        match self.parent.upgrade() {
            Some(parent) => parent.member_started(self.index),
            None => Ok(()),
        }
    }

    fn fsm_updates(&self) -> Result<(), FsmError> {
        match self.parent.upgrade() {
            Some(parent) => parent.member_updated(),
            None => Ok(()),
        }
    }

    fn fsm_stops(&self) -> Result<(), FsmError> {
        match self.parent.upgrade() {
            Some(parent) => parent.member_stopped(self.index),
            None => Ok(()),
        }
    }

    fn fsm_cancels(&self) -> Result<(), FsmError> {
        match self.parent.upgrade() {
            Some(parent) => parent.member_cancelled(self.index),
            None => Ok(()),
        }
    }
}

impl<E: 'static> fmt::Debug for ConcurrentFsm<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentFsm")
            .field("members", &self.inner.members)
            .field("policy", &self.inner.policy)
            .field("started", &self.inner.started.get())
            .field("bound", &self.inner.bound.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TransitionBuilder;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Touch {
        Down(u64),
        Move(u64),
        Up(u64),
    }

    impl Touch {
        fn id(&self) -> u64 {
            match self {
                Touch::Down(id) | Touch::Move(id) | Touch::Up(id) => *id,
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        log: RefCell<Vec<&'static str>>,
    }

    impl FsmHandler for Recorder {
        fn fsm_starts(&self) -> Result<(), FsmError> {
            self.log.borrow_mut().push("starts");
            Ok(())
        }

        fn fsm_updates(&self) -> Result<(), FsmError> {
            self.log.borrow_mut().push("updates");
            Ok(())
        }

        fn fsm_stops(&self) -> Result<(), FsmError> {
            self.log.borrow_mut().push("stops");
            Ok(())
        }

        fn fsm_cancels(&self) -> Result<(), FsmError> {
            self.log.borrow_mut().push("cancels");
            Ok(())
        }
    }

    fn touch_fsm() -> Fsm<Touch> {
        let fsm = Fsm::new().named("touch");
        let touched = fsm.add_standard_state("touched");
        let released = fsm.add_terminal_state("released");
        let aborted = fsm.add_cancelling_state("aborted");
        fsm.add_transition(
            TransitionBuilder::new()
                .from(fsm.initial())
                .to(touched)
                .on(&["touchstart"], |t: &Touch| matches!(t, Touch::Down(_)))
                .build()
                .unwrap(),
        )
        .unwrap();
        fsm.add_transition(
            TransitionBuilder::new()
                .from(touched)
                .to(touched)
                .on(&["touchmove"], |t: &Touch| matches!(t, Touch::Move(_)))
                .build()
                .unwrap(),
        )
        .unwrap();
        fsm.add_transition(
            TransitionBuilder::new()
                .from(touched)
                .to(released)
                .on(&["touchend"], |t: &Touch| matches!(t, Touch::Up(_)))
                .build()
                .unwrap(),
        )
        .unwrap();
        fsm.add_transition(
            TransitionBuilder::new()
                .from(touched)
                .to(aborted)
                .on(&["touchcancel"], |t: &Touch| *t == Touch::Down(99))
                .build()
                .unwrap(),
        )
        .unwrap();
        fsm
    }

    fn two_fingers(policy: StopPolicy) -> (ConcurrentFsm<Touch>, Rc<Recorder>) {
        let fsm = ConcurrentFsm::correlated(vec![touch_fsm(), touch_fsm()], policy, |t| {
            Some(t.id())
        })
        .unwrap();
        let recorder = Rc::new(Recorder::default());
        let weak: Weak<Recorder> = Rc::downgrade(&recorder);
        fsm.add_handler(weak);
        (fsm, recorder)
    }

    #[test]
    fn fewer_than_two_members_is_rejected() {
        let none = ConcurrentFsm::<Touch>::new(vec![], StopPolicy::FirstTerminal);
        assert!(matches!(none, Err(BuildError::NotEnoughMembers { found: 0 })));

        let one = ConcurrentFsm::new(vec![touch_fsm()], StopPolicy::FirstTerminal);
        assert!(matches!(one, Err(BuildError::NotEnoughMembers { found: 1 })));
    }

    #[test]
    fn starts_only_when_every_member_started() {
        let (fsm, recorder) = two_fingers(StopPolicy::FirstTerminal);

        fsm.process(&Touch::Down(1)).unwrap();
        assert!(!fsm.is_started());
        assert!(recorder.log.borrow().is_empty());
        assert_eq!(fsm.bound_key(0), Some(1));

        fsm.process(&Touch::Down(2)).unwrap();
        assert!(fsm.is_started());
        assert_eq!(*recorder.log.borrow(), vec!["starts"]);
        assert_eq!(fsm.bound_key(1), Some(2));
    }

    #[test]
    fn events_follow_their_bound_member() {
        let (fsm, recorder) = two_fingers(StopPolicy::FirstTerminal);
        fsm.process(&Touch::Down(1)).unwrap();
        fsm.process(&Touch::Down(2)).unwrap();

        fsm.process(&Touch::Move(2)).unwrap();
        fsm.process(&Touch::Move(1)).unwrap();

        assert_eq!(
            *recorder.log.borrow(),
            vec!["starts", "updates", "updates"]
        );
    }

    #[test]
    fn first_terminal_stops_once_without_restart() {
        let (fsm, recorder) = two_fingers(StopPolicy::FirstTerminal);
        fsm.process(&Touch::Down(1)).unwrap();
        fsm.process(&Touch::Down(2)).unwrap();

        fsm.process(&Touch::Up(1)).unwrap();
        assert!(!fsm.is_started());
        assert_eq!(*recorder.log.borrow(), vec!["starts", "stops"]);

        // The second finger was reset with the aggregate.
        assert!(!fsm.process(&Touch::Up(2)).unwrap());
        assert_eq!(*recorder.log.borrow(), vec!["starts", "stops"]);
    }

    #[test]
    fn all_terminal_waits_for_every_member() {
        let (fsm, recorder) = two_fingers(StopPolicy::AllTerminal);
        fsm.process(&Touch::Down(1)).unwrap();
        fsm.process(&Touch::Down(2)).unwrap();

        fsm.process(&Touch::Up(1)).unwrap();
        assert_eq!(*recorder.log.borrow(), vec!["starts"]);

        fsm.process(&Touch::Up(2)).unwrap();
        assert_eq!(*recorder.log.borrow(), vec!["starts", "stops"]);
    }

    #[test]
    fn member_cancellation_is_reraised() {
        let fsm = ConcurrentFsm::new(vec![touch_fsm(), touch_fsm()], StopPolicy::FirstTerminal)
            .unwrap();
        let recorder = Rc::new(Recorder::default());
        let weak: Weak<Recorder> = Rc::downgrade(&recorder);
        fsm.add_handler(weak);

        fsm.process(&Touch::Down(1)).unwrap();
        fsm.process(&Touch::Down(2)).unwrap();
        fsm.process(&Touch::Down(99)).unwrap();

        assert_eq!(*recorder.log.borrow(), vec!["starts", "cancels"]);
        assert!(!fsm.is_started());
        assert!(fsm.members().iter().all(|m| !m.is_started()));
    }

    #[test]
    fn uninstall_cascades_to_members() {
        let (fsm, recorder) = two_fingers(StopPolicy::FirstTerminal);
        fsm.process(&Touch::Down(1)).unwrap();

        fsm.uninstall();

        for member in fsm.members() {
            assert!(!member.is_started());
            assert_eq!(member.handler_count(), 0);
        }
        fsm.process(&Touch::Down(1)).unwrap();
        fsm.process(&Touch::Down(2)).unwrap();
        assert!(recorder.log.borrow().is_empty());
    }

    #[test]
    fn accepted_events_union_members() {
        let (fsm, _) = two_fingers(StopPolicy::FirstTerminal);
        fsm.process(&Touch::Down(1)).unwrap();

        let events = fsm.accepted_events();
        assert!(events.contains("touchstart"));
        assert!(events.contains("touchend"));
        assert!(events.contains("touchmove"));
    }
}
