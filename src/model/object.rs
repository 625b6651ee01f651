//! Visible-object value types and their state machines.
//!
//! A visible object is a synchronization primitive whose state the model
//! tracks: mutex, condition variable, or counting semaphore. Threads are
//! tracked separately in the runner table (they carry a [`RunnerId`]
//! rather than an [`ObjectId`]; see [`crate::model::state`]).
//!
//! Equality between objects is by id, never by state; these types therefore
//! deliberately do not implement `PartialEq`.

use crate::types::{ObjectId, RunnerId};
use std::collections::VecDeque;

/// State machine of a tracked mutex.
#[derive(Debug, Clone, Copy)]
pub enum MutexState {
    /// Never initialized, or first observed through a non-init operation.
    Uninitialized,
    /// Initialized and free.
    Unlocked,
    /// Held by the given runner.
    LockedBy(RunnerId),
    /// Destroyed; must be re-initialized before reuse.
    Destroyed,
}

/// A tracked mutex.
#[derive(Debug, Clone)]
pub struct MutexObject {
    /// Current lock state.
    pub state: MutexState,
}

impl MutexObject {
    /// A mutex first observed through an operation other than init.
    #[must_use]
    pub const fn uninitialized() -> Self {
        Self {
            state: MutexState::Uninitialized,
        }
    }

    /// True iff some runner currently holds the mutex.
    #[must_use]
    pub const fn holder(&self) -> Option<RunnerId> {
        match self.state {
            MutexState::LockedBy(r) => Some(r),
            _ => None,
        }
    }

    /// True iff the mutex is initialized and free.
    #[must_use]
    pub const fn is_unlocked(&self) -> bool {
        matches!(self.state, MutexState::Unlocked)
    }
}

/// Lifecycle state of a condition variable.
#[derive(Debug, Clone, Copy)]
pub enum CondLifecycle {
    /// Never initialized, or first observed through a non-init operation.
    Uninitialized,
    /// Initialized and usable.
    Valid,
    /// Destroyed; must be re-initialized before reuse.
    Destroyed,
}

/// A tracked condition variable.
///
/// The wait queue is one FIFO split into two segments: `waiting` holds
/// runners that have enqueued but not been signalled, `wakeable` holds
/// runners a signal or broadcast has released. A runner's `cond_awake`
/// becomes eligible only once it reaches the wakeable segment.
#[derive(Debug, Clone)]
pub struct CondObject {
    /// Lifecycle state.
    pub lifecycle: CondLifecycle,
    /// The mutex associated on first wait; never changes once set.
    pub mutex: Option<ObjectId>,
    /// Runners enqueued and not yet signalled, in arrival order.
    waiting: VecDeque<RunnerId>,
    /// Runners released by a signal/broadcast, in release order.
    wakeable: VecDeque<RunnerId>,
}

impl CondObject {
    /// A condition variable first observed through an operation other than
    /// init.
    #[must_use]
    pub const fn uninitialized() -> Self {
        Self {
            lifecycle: CondLifecycle::Uninitialized,
            mutex: None,
            waiting: VecDeque::new(),
            wakeable: VecDeque::new(),
        }
    }

    /// Reset to a freshly initialized variable with an empty queue.
    pub fn initialize(&mut self) {
        self.lifecycle = CondLifecycle::Valid;
        self.mutex = None;
        self.waiting.clear();
        self.wakeable.clear();
    }

    /// Append a runner to the back of the wait queue.
    pub fn enqueue_waiter(&mut self, runner: RunnerId) {
        self.waiting.push_back(runner);
    }

    /// Release the front waiter, if any. Returns the released runner.
    pub fn signal_one(&mut self) -> Option<RunnerId> {
        let runner = self.waiting.pop_front()?;
        self.wakeable.push_back(runner);
        Some(runner)
    }

    /// Release every waiter in FIFO order.
    pub fn broadcast(&mut self) {
        while self.signal_one().is_some() {}
    }

    /// True iff a signal has released the runner and it may reacquire.
    #[must_use]
    pub fn is_wakeable(&self, runner: RunnerId) -> bool {
        self.wakeable.contains(&runner)
    }

    /// Remove a released runner as it awakes.
    pub fn remove_wakeable(&mut self, runner: RunnerId) {
        self.wakeable.retain(|&r| r != runner);
    }

    /// True iff any runner is queued, signalled or not.
    #[must_use]
    pub fn has_waiters(&self) -> bool {
        !self.waiting.is_empty() || !self.wakeable.is_empty()
    }

    /// Every queued runner, unsignalled first, each segment in FIFO order.
    pub fn queued(&self) -> impl Iterator<Item = RunnerId> + '_ {
        self.waiting.iter().chain(self.wakeable.iter()).copied()
    }
}

/// A tracked counting semaphore.
#[derive(Debug, Clone)]
pub struct SemaphoreObject {
    /// Whether `sem_init` has run.
    pub initialized: bool,
    /// Current count; never negative by construction.
    pub count: u32,
    /// Runners whose pending transition is a wait on this semaphore and
    /// who have not yet decremented, in arrival order.
    waiting: VecDeque<RunnerId>,
}

impl SemaphoreObject {
    /// A semaphore first observed through an operation other than init.
    #[must_use]
    pub const fn uninitialized() -> Self {
        Self {
            initialized: false,
            count: 0,
            waiting: VecDeque::new(),
        }
    }

    /// Record a runner whose pending transition waits on this semaphore.
    pub fn enqueue_waiter(&mut self, runner: RunnerId) {
        if !self.waiting.contains(&runner) {
            self.waiting.push_back(runner);
        }
    }

    /// Remove a runner whose wait completed (or was withdrawn).
    pub fn remove_waiter(&mut self, runner: RunnerId) {
        self.waiting.retain(|&r| r != runner);
    }

    /// True iff the runner is recorded as waiting.
    #[must_use]
    pub fn is_waiting(&self, runner: RunnerId) -> bool {
        self.waiting.contains(&runner)
    }
}

/// State machine of a tracked thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Created but not yet released by its creator's `thread_create`.
    Embryo,
    /// Executing between interception points.
    Running,
    /// Parked in a condition-variable wait queue.
    Sleeping,
    /// Exited; no further transitions.
    Finished,
}

/// A tracked thread, held in the runner table.
///
/// Threads are unique in that they have two identities: the dense
/// [`RunnerId`] used throughout the model, and the remote `pthread_t`
/// value kept by the coordinator's address map.
#[derive(Debug, Clone)]
pub struct ThreadObject {
    /// Current lifecycle state.
    pub state: ThreadState,
    /// The runner whose pending transition joins on this thread, if any.
    pub joined_by: Option<RunnerId>,
    /// Set when the forward-progress check saw no progress goal since the
    /// thread was last marked live.
    pub maybe_starved: bool,
    /// Whether the thread has passed a progress goal at least once.
    pub hit_progress_goal: bool,
}

impl ThreadObject {
    /// A thread in the given initial state.
    #[must_use]
    pub const fn new(state: ThreadState) -> Self {
        Self {
            state,
            joined_by: None,
            maybe_starved: false,
            hit_progress_goal: false,
        }
    }

    /// True while the thread can still execute transitions.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self.state, ThreadState::Running | ThreadState::Sleeping)
    }

    /// True once the thread has exited.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self.state, ThreadState::Finished)
    }

    /// Considered starved iff marked and never past a progress goal.
    #[must_use]
    pub const fn is_starved(&self) -> bool {
        self.maybe_starved && !self.hit_progress_goal
    }
}

/// Sum over the non-runner visible-object variants.
#[derive(Debug, Clone)]
pub enum VisibleObject {
    /// A tracked mutex.
    Mutex(MutexObject),
    /// A tracked condition variable.
    Cond(CondObject),
    /// A tracked counting semaphore.
    Semaphore(SemaphoreObject),
}

impl VisibleObject {
    /// Short kind name for diagnostics.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Mutex(_) => "mutex",
            Self::Cond(_) => "cond",
            Self::Semaphore(_) => "semaphore",
        }
    }

    /// View as a mutex, if it is one.
    #[must_use]
    pub const fn as_mutex(&self) -> Option<&MutexObject> {
        match self {
            Self::Mutex(m) => Some(m),
            _ => None,
        }
    }

    /// Mutable view as a mutex, if it is one.
    pub fn as_mutex_mut(&mut self) -> Option<&mut MutexObject> {
        match self {
            Self::Mutex(m) => Some(m),
            _ => None,
        }
    }

    /// View as a condition variable, if it is one.
    #[must_use]
    pub const fn as_cond(&self) -> Option<&CondObject> {
        match self {
            Self::Cond(c) => Some(c),
            _ => None,
        }
    }

    /// Mutable view as a condition variable, if it is one.
    pub fn as_cond_mut(&mut self) -> Option<&mut CondObject> {
        match self {
            Self::Cond(c) => Some(c),
            _ => None,
        }
    }

    /// View as a semaphore, if it is one.
    #[must_use]
    pub const fn as_semaphore(&self) -> Option<&SemaphoreObject> {
        match self {
            Self::Semaphore(s) => Some(s),
            _ => None,
        }
    }

    /// Mutable view as a semaphore, if it is one.
    pub fn as_semaphore_mut(&mut self) -> Option<&mut SemaphoreObject> {
        match self {
            Self::Semaphore(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cond_signal_releases_fifo() {
        let mut c = CondObject::uninitialized();
        c.initialize();
        c.enqueue_waiter(RunnerId::new(1));
        c.enqueue_waiter(RunnerId::new(2));
        assert!(!c.is_wakeable(RunnerId::new(1)));

        assert_eq!(c.signal_one(), Some(RunnerId::new(1)));
        assert!(c.is_wakeable(RunnerId::new(1)));
        assert!(!c.is_wakeable(RunnerId::new(2)));

        c.remove_wakeable(RunnerId::new(1));
        assert!(c.has_waiters());
        assert_eq!(c.queued().collect::<Vec<_>>(), vec![RunnerId::new(2)]);
    }

    #[test]
    fn cond_broadcast_releases_all_in_order() {
        let mut c = CondObject::uninitialized();
        c.initialize();
        c.enqueue_waiter(RunnerId::new(3));
        c.enqueue_waiter(RunnerId::new(1));
        c.broadcast();
        assert!(c.is_wakeable(RunnerId::new(3)));
        assert!(c.is_wakeable(RunnerId::new(1)));
        assert_eq!(
            c.queued().collect::<Vec<_>>(),
            vec![RunnerId::new(3), RunnerId::new(1)]
        );
    }

    #[test]
    fn signal_with_no_waiters_is_a_noop() {
        let mut c = CondObject::uninitialized();
        c.initialize();
        assert_eq!(c.signal_one(), None);
        assert!(!c.has_waiters());
    }

    #[test]
    fn semaphore_waiter_bookkeeping_is_idempotent() {
        let mut s = SemaphoreObject::uninitialized();
        s.enqueue_waiter(RunnerId::new(4));
        s.enqueue_waiter(RunnerId::new(4));
        assert!(s.is_waiting(RunnerId::new(4)));
        s.remove_waiter(RunnerId::new(4));
        assert!(!s.is_waiting(RunnerId::new(4)));
    }

    #[test]
    fn thread_liveness_follows_state() {
        let mut t = ThreadObject::new(ThreadState::Embryo);
        assert!(!t.is_live());
        t.state = ThreadState::Running;
        assert!(t.is_live());
        t.state = ThreadState::Sleeping;
        assert!(t.is_live());
        t.state = ThreadState::Finished;
        assert!(t.is_finished());
    }
}
