//! Timer delivery for timed transitions.
//!
//! The engine is single-threaded: arming a timer hands a callback to the
//! embedding event loop, which later runs it on the same thread. The
//! [`TimerService`] trait is that event loop's boundary. [`VirtualClock`] is a
//! deterministic implementation driven by explicit calls to
//! [`VirtualClock::advance`], suitable for tests and for hosts that already
//! own a frame clock.

use crate::fsm::FsmError;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::Duration;

/// Identifies a scheduled callback so that it can be cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

/// Deferred work scheduled by a timed transition.
pub type TimerCallback = Box<dyn FnOnce() -> Result<(), FsmError>>;

/// Event-loop collaborator that runs callbacks after a delay.
pub trait TimerService {
    /// Schedule `callback` to run once `delay` has elapsed.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerToken;

    /// Cancel a pending callback. Unknown or already-run tokens are ignored.
    fn cancel(&self, token: TimerToken);
}

struct Pending {
    token: TimerToken,
    deadline: Duration,
    callback: TimerCallback,
}

/// Manually advanced clock holding pending timer callbacks.
///
/// # Example
///
/// ```rust
/// use gestalt::core::{TimerService, VirtualClock};
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let clock = VirtualClock::new();
/// let fired = Rc::new(Cell::new(false));
/// let flag = Rc::clone(&fired);
///
/// clock.schedule(Duration::from_millis(100), Box::new(move || {
///     flag.set(true);
///     Ok(())
/// }));
///
/// clock.advance(Duration::from_millis(99)).unwrap();
/// assert!(!fired.get());
/// clock.advance(Duration::from_millis(1)).unwrap();
/// assert!(fired.get());
/// ```
#[derive(Default)]
pub struct VirtualClock {
    now: Cell<Duration>,
    next_token: Cell<u64>,
    pending: RefCell<Vec<Pending>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since the clock was created.
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of callbacks waiting to run.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Move time forward by `by`, running every callback that falls due, in
    /// deadline order (ties in scheduling order).
    ///
    /// Callbacks may schedule new timers; those run too if they fall due
    /// within the same advance. Stops at the first failing callback and
    /// returns its error. Returns the number of callbacks run otherwise.
    pub fn advance(&self, by: Duration) -> Result<usize, FsmError> {
        let target = self.now.get() + by;
        let mut fired = 0;

        while let Some(due) = self.pop_due(target) {
            if due.deadline > self.now.get() {
                self.now.set(due.deadline);
            }
            fired += 1;
            (due.callback)()?;
        }

        self.now.set(target);
        Ok(fired)
    }

    fn pop_due(&self, target: Duration) -> Option<Pending> {
        let mut pending = self.pending.borrow_mut();
        let index = pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.deadline <= target)
            .min_by_key(|(_, p)| (p.deadline, p.token))
            .map(|(i, _)| i)?;
        Some(pending.remove(index))
    }
}

impl TimerService for VirtualClock {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerToken {
        let token = TimerToken(self.next_token.get());
        self.next_token.set(token.0 + 1);
        self.pending.borrow_mut().push(Pending {
            token,
            deadline: self.now.get() + delay,
            callback,
        });
        token
    }

    fn cancel(&self, token: TimerToken) {
        self.pending.borrow_mut().retain(|p| p.token != token);
    }
}

impl fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualClock")
            .field("now", &self.now.get())
            .field("pending", &self.pending())
            .finish()
    }
}
