//! The transition taxonomy: one variant per primitive operation.
//!
//! A transition is an indivisible synchronization step executed by one
//! runner between two interception points. Transitions hold object ids,
//! never references into a state, so a transition can be re-interpreted in
//! any state whose id assignment matches (see [`Transition::clone_in`]).
//!
//! Enabledness and undefined-behavior detection both live in
//! [`Transition::status`]: a pending transition is `Enabled`, `Blocked`
//! (will become enabled once another runner moves), or `Undefined` (the
//! target is about to invoke an operation on an object in a forbidden
//! state). Application is only legal for enabled transitions.

use crate::model::object::{CondLifecycle, MutexState, ThreadState};
use crate::model::state::ProgramState;
use crate::types::{ObjectId, RunnerId};
use smallvec::SmallVec;
use std::fmt;

/// The operation performed by a transition, with its operand object ids.
#[derive(Debug, Clone, Eq)]
pub enum Op {
    /// `pthread_mutex_init`.
    MutexInit {
        /// The mutex being initialized.
        mutex: ObjectId,
    },
    /// `pthread_mutex_lock`.
    MutexLock {
        /// The mutex being acquired.
        mutex: ObjectId,
    },
    /// `pthread_mutex_unlock`.
    MutexUnlock {
        /// The mutex being released.
        mutex: ObjectId,
    },
    /// `pthread_mutex_destroy`.
    MutexDestroy {
        /// The mutex being destroyed.
        mutex: ObjectId,
    },
    /// `pthread_cond_init`.
    CondInit {
        /// The condition variable being initialized.
        cond: ObjectId,
    },
    /// First half of `pthread_cond_wait`: enqueue and release the mutex.
    CondEnqueue {
        /// The condition variable waited on.
        cond: ObjectId,
        /// The mutex released while waiting.
        mutex: ObjectId,
    },
    /// Second half of `pthread_cond_wait`: wake and reacquire the mutex.
    CondAwake {
        /// The condition variable waited on.
        cond: ObjectId,
        /// The mutex reacquired on wake.
        mutex: ObjectId,
    },
    /// `pthread_cond_signal`.
    CondSignal {
        /// The condition variable signalled.
        cond: ObjectId,
    },
    /// `pthread_cond_broadcast`.
    CondBroadcast {
        /// The condition variable broadcast.
        cond: ObjectId,
    },
    /// `pthread_cond_destroy`.
    CondDestroy {
        /// The condition variable being destroyed.
        cond: ObjectId,
    },
    /// `sem_init`.
    SemInit {
        /// The semaphore being initialized.
        sem: ObjectId,
        /// The initial count.
        count: u32,
    },
    /// `sem_wait`.
    SemWait {
        /// The semaphore being decremented.
        sem: ObjectId,
        /// Count observed when the transition was applied (or decoded, for
        /// a still-pending transition). Derived bookkeeping used by the
        /// dependence relation; excluded from equality.
        available: u32,
    },
    /// `sem_post`.
    SemPost {
        /// The semaphore being incremented.
        sem: ObjectId,
    },
    /// `pthread_create`.
    ThreadCreate {
        /// The runner brought to life.
        child: RunnerId,
    },
    /// Entry of a thread into its body.
    ThreadStart,
    /// Exit of a thread.
    ThreadExit,
    /// `pthread_join`.
    ThreadJoin {
        /// The runner joined on.
        target: RunnerId,
    },
}

impl PartialEq for Op {
    fn eq(&self, other: &Self) -> bool {
        use Op::{
            CondAwake, CondBroadcast, CondDestroy, CondEnqueue, CondInit, CondSignal, MutexDestroy,
            MutexInit, MutexLock, MutexUnlock, SemInit, SemPost, SemWait, ThreadCreate, ThreadExit,
            ThreadJoin, ThreadStart,
        };
        match (self, other) {
            (MutexInit { mutex: a }, MutexInit { mutex: b })
            | (MutexLock { mutex: a }, MutexLock { mutex: b })
            | (MutexUnlock { mutex: a }, MutexUnlock { mutex: b })
            | (MutexDestroy { mutex: a }, MutexDestroy { mutex: b }) => a == b,
            (CondInit { cond: a }, CondInit { cond: b })
            | (CondSignal { cond: a }, CondSignal { cond: b })
            | (CondBroadcast { cond: a }, CondBroadcast { cond: b })
            | (CondDestroy { cond: a }, CondDestroy { cond: b }) => a == b,
            (
                CondEnqueue { cond: a, mutex: am },
                CondEnqueue { cond: b, mutex: bm },
            )
            | (
                CondAwake { cond: a, mutex: am },
                CondAwake { cond: b, mutex: bm },
            ) => a == b && am == bm,
            (
                SemInit { sem: a, count: ac },
                SemInit { sem: b, count: bc },
            ) => a == b && ac == bc,
            // `available` is derived state, not part of the action.
            (SemWait { sem: a, .. }, SemWait { sem: b, .. }) => a == b,
            (SemPost { sem: a }, SemPost { sem: b }) => a == b,
            (ThreadCreate { child: a }, ThreadCreate { child: b }) => a == b,
            (ThreadStart, ThreadStart) | (ThreadExit, ThreadExit) => true,
            (ThreadJoin { target: a }, ThreadJoin { target: b }) => a == b,
            _ => false,
        }
    }
}

/// Discriminant of [`Op`], used to key the cross-variant dispatch tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// `pthread_mutex_init`.
    MutexInit,
    /// `pthread_mutex_lock`.
    MutexLock,
    /// `pthread_mutex_unlock`.
    MutexUnlock,
    /// `pthread_mutex_destroy`.
    MutexDestroy,
    /// `pthread_cond_init`.
    CondInit,
    /// First half of `pthread_cond_wait`.
    CondEnqueue,
    /// Second half of `pthread_cond_wait`.
    CondAwake,
    /// `pthread_cond_signal`.
    CondSignal,
    /// `pthread_cond_broadcast`.
    CondBroadcast,
    /// `pthread_cond_destroy`.
    CondDestroy,
    /// `sem_init`.
    SemInit,
    /// `sem_wait`.
    SemWait,
    /// `sem_post`.
    SemPost,
    /// `pthread_create`.
    ThreadCreate,
    /// Thread body entry.
    ThreadStart,
    /// Thread exit.
    ThreadExit,
    /// `pthread_join`.
    ThreadJoin,
}

/// Classification of a pending transition in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionStatus {
    /// Preconditions hold; the transition may execute now.
    Enabled,
    /// Preconditions may hold later (another runner must move first).
    Blocked,
    /// The operation targets an object in a forbidden state.
    Undefined(&'static str),
}

impl TransitionStatus {
    /// True iff the transition may execute now.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }

    /// The undefined-behavior message, if any.
    #[must_use]
    pub const fn undefined_message(self) -> Option<&'static str> {
        match self {
            Self::Undefined(msg) => Some(msg),
            _ => None,
        }
    }
}

/// An indivisible synchronization step by one runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The runner executing the step.
    pub executor: RunnerId,
    /// The operation and its operands.
    pub op: Op,
}

impl Transition {
    /// Construct a transition.
    #[must_use]
    pub const fn new(executor: RunnerId, op: Op) -> Self {
        Self { executor, op }
    }

    /// The `thread_start` transition seeded for a freshly observed runner.
    #[must_use]
    pub const fn thread_start(runner: RunnerId) -> Self {
        Self::new(runner, Op::ThreadStart)
    }

    /// Discriminant of the operation.
    #[must_use]
    pub const fn kind(&self) -> OpKind {
        match self.op {
            Op::MutexInit { .. } => OpKind::MutexInit,
            Op::MutexLock { .. } => OpKind::MutexLock,
            Op::MutexUnlock { .. } => OpKind::MutexUnlock,
            Op::MutexDestroy { .. } => OpKind::MutexDestroy,
            Op::CondInit { .. } => OpKind::CondInit,
            Op::CondEnqueue { .. } => OpKind::CondEnqueue,
            Op::CondAwake { .. } => OpKind::CondAwake,
            Op::CondSignal { .. } => OpKind::CondSignal,
            Op::CondBroadcast { .. } => OpKind::CondBroadcast,
            Op::CondDestroy { .. } => OpKind::CondDestroy,
            Op::SemInit { .. } => OpKind::SemInit,
            Op::SemWait { .. } => OpKind::SemWait,
            Op::SemPost { .. } => OpKind::SemPost,
            Op::ThreadCreate { .. } => OpKind::ThreadCreate,
            Op::ThreadStart => OpKind::ThreadStart,
            Op::ThreadExit => OpKind::ThreadExit,
            Op::ThreadJoin { .. } => OpKind::ThreadJoin,
        }
    }

    /// True iff applying this transition finishes its executor.
    #[must_use]
    pub const fn is_thread_exit(&self) -> bool {
        matches!(self.op, Op::ThreadExit)
    }

    /// Ids of the non-runner objects this transition touches.
    #[must_use]
    pub fn objects(&self) -> SmallVec<[ObjectId; 2]> {
        match self.op {
            Op::MutexInit { mutex }
            | Op::MutexLock { mutex }
            | Op::MutexUnlock { mutex }
            | Op::MutexDestroy { mutex } => SmallVec::from_slice(&[mutex]),
            Op::CondInit { cond }
            | Op::CondSignal { cond }
            | Op::CondBroadcast { cond }
            | Op::CondDestroy { cond } => SmallVec::from_slice(&[cond]),
            Op::CondEnqueue { cond, mutex } | Op::CondAwake { cond, mutex } => {
                SmallVec::from_slice(&[cond, mutex])
            }
            Op::SemInit { sem, .. } | Op::SemWait { sem, .. } | Op::SemPost { sem } => {
                SmallVec::from_slice(&[sem])
            }
            Op::ThreadCreate { .. } | Op::ThreadStart | Op::ThreadExit | Op::ThreadJoin { .. } => {
                SmallVec::new()
            }
        }
    }

    /// Classify this transition in `state`.
    ///
    /// `Blocked` covers every wait-until-somebody-moves situation;
    /// `Undefined` covers the usage errors the model checker reports
    /// (locking an uninitialized mutex, unlocking a mutex not held,
    /// waiting on a destroyed condition variable, and so on).
    #[must_use]
    pub fn status(&self, state: &ProgramState) -> TransitionStatus {
        use TransitionStatus::{Blocked, Enabled, Undefined};
        match self.op {
            Op::MutexInit { mutex } => match state.mutex(mutex).state {
                // Re-initializing an unlocked mutex is admitted: the state
                // machine runs uninitialized -> unlocked again.
                MutexState::Uninitialized | MutexState::Unlocked | MutexState::Destroyed => Enabled,
                MutexState::LockedBy(_) => {
                    Undefined("initializing a mutex that is currently held")
                }
            },
            Op::MutexLock { mutex } => match state.mutex(mutex).state {
                MutexState::Unlocked => Enabled,
                MutexState::LockedBy(_) => Blocked,
                MutexState::Uninitialized => Undefined("locking an uninitialized mutex"),
                MutexState::Destroyed => Undefined("locking a destroyed mutex"),
            },
            Op::MutexUnlock { mutex } => match state.mutex(mutex).state {
                MutexState::LockedBy(holder) if holder == self.executor => Enabled,
                MutexState::LockedBy(_) => Undefined("unlocking a mutex held by another thread"),
                MutexState::Unlocked => Undefined("unlocking a mutex that is not locked"),
                MutexState::Uninitialized => Undefined("unlocking an uninitialized mutex"),
                MutexState::Destroyed => Undefined("unlocking a destroyed mutex"),
            },
            Op::MutexDestroy { mutex } => match state.mutex(mutex).state {
                MutexState::Unlocked => Enabled,
                MutexState::LockedBy(_) => Undefined("destroying a mutex that is currently held"),
                MutexState::Uninitialized => Undefined("destroying an uninitialized mutex"),
                MutexState::Destroyed => Undefined("destroying a mutex twice"),
            },
            Op::CondInit { cond } => {
                let c = state.cond(cond);
                match c.lifecycle {
                    CondLifecycle::Uninitialized | CondLifecycle::Destroyed => Enabled,
                    CondLifecycle::Valid if !c.has_waiters() => Enabled,
                    CondLifecycle::Valid => {
                        Undefined("initializing a condition variable with waiters")
                    }
                }
            }
            Op::CondEnqueue { cond, mutex } => {
                let c = state.cond(cond);
                match c.lifecycle {
                    CondLifecycle::Uninitialized => {
                        return Undefined("waiting on an uninitialized condition variable");
                    }
                    CondLifecycle::Destroyed => {
                        return Undefined("waiting on a destroyed condition variable");
                    }
                    CondLifecycle::Valid => {}
                }
                if c.mutex.is_some_and(|m| m != mutex) {
                    return Undefined(
                        "waiting with a second mutex on a condition variable already \
                         associated with another",
                    );
                }
                match state.mutex(mutex).state {
                    MutexState::LockedBy(holder) if holder == self.executor => Enabled,
                    _ => Undefined("waiting on a condition variable without holding the mutex"),
                }
            }
            Op::CondAwake { cond, mutex } => {
                let c = state.cond(cond);
                if matches!(c.lifecycle, CondLifecycle::Destroyed) {
                    return Undefined("condition variable destroyed while a thread was waiting");
                }
                if c.is_wakeable(self.executor) && state.mutex(mutex).is_unlocked() {
                    Enabled
                } else {
                    Blocked
                }
            }
            Op::CondSignal { cond } | Op::CondBroadcast { cond } => {
                match state.cond(cond).lifecycle {
                    CondLifecycle::Valid => Enabled,
                    CondLifecycle::Uninitialized => {
                        Undefined("signalling an uninitialized condition variable")
                    }
                    CondLifecycle::Destroyed => {
                        Undefined("signalling a destroyed condition variable")
                    }
                }
            }
            Op::CondDestroy { cond } => {
                let c = state.cond(cond);
                match c.lifecycle {
                    CondLifecycle::Valid if !c.has_waiters() => Enabled,
                    CondLifecycle::Valid => {
                        Undefined("destroying a condition variable with waiters")
                    }
                    CondLifecycle::Uninitialized => {
                        Undefined("destroying an uninitialized condition variable")
                    }
                    CondLifecycle::Destroyed => {
                        Undefined("destroying a condition variable twice")
                    }
                }
            }
            Op::SemInit { sem, .. } => {
                if state.semaphore(sem).initialized {
                    Undefined("initializing a semaphore twice")
                } else {
                    Enabled
                }
            }
            Op::SemWait { sem, .. } => {
                let s = state.semaphore(sem);
                if !s.initialized {
                    Undefined("waiting on an uninitialized semaphore")
                } else if s.count > 0 {
                    Enabled
                } else {
                    Blocked
                }
            }
            Op::SemPost { sem } => {
                if state.semaphore(sem).initialized {
                    Enabled
                } else {
                    Undefined("posting to an uninitialized semaphore")
                }
            }
            Op::ThreadCreate { .. } | Op::ThreadExit => Enabled,
            Op::ThreadStart => match state.thread(self.executor).state {
                ThreadState::Running => TransitionStatus::Enabled,
                _ => Blocked,
            },
            Op::ThreadJoin { target } => {
                if state.thread(target).is_finished() {
                    Enabled
                } else {
                    Blocked
                }
            }
        }
    }

    /// True iff the transition may execute now.
    #[must_use]
    pub fn enabled(&self, state: &ProgramState) -> bool {
        self.status(state).is_enabled()
    }

    /// Rebind this transition into another state.
    ///
    /// Object and runner ids are dense indices assigned in observation
    /// order, so a clone is interpretable in any state produced by the same
    /// observation sequence. Debug builds verify the operands are live.
    #[must_use]
    pub fn clone_in(&self, state: &ProgramState) -> Self {
        debug_assert!(
            self.objects().iter().all(|id| state.has_object(*id)),
            "transition operands must be live in the target state"
        );
        debug_assert!(state.has_runner(self.executor));
        self.clone()
    }

    /// Mutate `state` according to the operation's effect.
    ///
    /// Undefined if the transition is not enabled in `state`; debug builds
    /// assert it.
    pub(crate) fn execute(&self, state: &mut ProgramState) {
        debug_assert!(
            self.enabled(state),
            "applying a transition that is not enabled: {self}"
        );
        match self.op {
            Op::MutexInit { mutex } => {
                state.mutex_mut(mutex).state = MutexState::Unlocked;
            }
            Op::MutexLock { mutex } => {
                state.mutex_mut(mutex).state = MutexState::LockedBy(self.executor);
            }
            Op::MutexUnlock { mutex } => {
                state.mutex_mut(mutex).state = MutexState::Unlocked;
            }
            Op::MutexDestroy { mutex } => {
                state.mutex_mut(mutex).state = MutexState::Destroyed;
            }
            Op::CondInit { cond } => {
                state.cond_mut(cond).initialize();
            }
            Op::CondEnqueue { cond, mutex } => {
                let c = state.cond_mut(cond);
                c.enqueue_waiter(self.executor);
                c.mutex.get_or_insert(mutex);
                state.mutex_mut(mutex).state = MutexState::Unlocked;
                state.thread_mut(self.executor).state = ThreadState::Sleeping;
            }
            Op::CondAwake { cond, mutex } => {
                state.cond_mut(cond).remove_wakeable(self.executor);
                state.mutex_mut(mutex).state = MutexState::LockedBy(self.executor);
                state.thread_mut(self.executor).state = ThreadState::Running;
            }
            Op::CondSignal { cond } => {
                state.cond_mut(cond).signal_one();
            }
            Op::CondBroadcast { cond } => {
                state.cond_mut(cond).broadcast();
            }
            Op::CondDestroy { cond } => {
                state.cond_mut(cond).lifecycle = CondLifecycle::Destroyed;
            }
            Op::SemInit { sem, count } => {
                let s = state.semaphore_mut(sem);
                s.initialized = true;
                s.count = count;
            }
            Op::SemWait { sem, .. } => {
                let executor = self.executor;
                let s = state.semaphore_mut(sem);
                s.count -= 1;
                s.remove_waiter(executor);
            }
            Op::SemPost { sem } => {
                state.semaphore_mut(sem).count += 1;
            }
            Op::ThreadCreate { child } => {
                state.thread_mut(child).state = ThreadState::Running;
            }
            Op::ThreadStart => {}
            Op::ThreadExit => {
                state.thread_mut(self.executor).state = ThreadState::Finished;
            }
            Op::ThreadJoin { target } => {
                state.thread_mut(target).joined_by = None;
            }
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Op::MutexInit { mutex } => write!(f, "pthread_mutex_init({mutex})"),
            Op::MutexLock { mutex } => write!(f, "pthread_mutex_lock({mutex})"),
            Op::MutexUnlock { mutex } => write!(f, "pthread_mutex_unlock({mutex})"),
            Op::MutexDestroy { mutex } => write!(f, "pthread_mutex_destroy({mutex})"),
            Op::CondInit { cond } => write!(f, "pthread_cond_init({cond})"),
            Op::CondEnqueue { cond, mutex } => {
                write!(f, "pthread_cond_wait({cond}, {mutex}) (asleep)")
            }
            Op::CondAwake { cond, mutex } => {
                write!(f, "pthread_cond_wait({cond}, {mutex}) (awake)")
            }
            Op::CondSignal { cond } => write!(f, "pthread_cond_signal({cond})"),
            Op::CondBroadcast { cond } => write!(f, "pthread_cond_broadcast({cond})"),
            Op::CondDestroy { cond } => write!(f, "pthread_cond_destroy({cond})"),
            Op::SemInit { sem, count } => write!(f, "sem_init({sem}, {count})"),
            Op::SemWait { sem, .. } => write!(f, "sem_wait({sem})"),
            Op::SemPost { sem } => write!(f, "sem_post({sem})"),
            Op::ThreadCreate { child } => write!(f, "pthread_create(thread {child})"),
            Op::ThreadStart => write!(f, "starts"),
            Op::ThreadExit => write!(f, "exits"),
            Op::ThreadJoin { target } => write!(f, "pthread_join(thread {target})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::object::{MutexObject, VisibleObject};
    use crate::model::state::ProgramState;

    fn state_with_mutex() -> (ProgramState, RunnerId, ObjectId) {
        let mut state = ProgramState::with_main_thread();
        let m = state.add_object(VisibleObject::Mutex(MutexObject::uninitialized()));
        (state, RunnerId::MAIN, m)
    }

    #[test]
    fn lock_uninitialized_mutex_is_undefined() {
        let (state, main, m) = state_with_mutex();
        let lock = Transition::new(main, Op::MutexLock { mutex: m });
        assert!(matches!(
            lock.status(&state),
            TransitionStatus::Undefined(_)
        ));
    }

    #[test]
    fn lock_follows_init_and_blocks_second_locker() {
        let (mut state, main, m) = state_with_mutex();
        let other = state.add_runner(ThreadState::Running);

        state.apply(&Transition::new(main, Op::MutexInit { mutex: m }));
        let lock = Transition::new(main, Op::MutexLock { mutex: m });
        assert!(lock.enabled(&state));
        state.apply(&lock);

        let second = Transition::new(other, Op::MutexLock { mutex: m });
        assert_eq!(second.status(&state), TransitionStatus::Blocked);

        let unlock = Transition::new(main, Op::MutexUnlock { mutex: m });
        assert!(unlock.enabled(&state));
        state.apply(&unlock);
        assert!(second.enabled(&state));
    }

    #[test]
    fn unlock_by_non_holder_is_undefined() {
        let (mut state, main, m) = state_with_mutex();
        let other = state.add_runner(ThreadState::Running);
        state.apply(&Transition::new(main, Op::MutexInit { mutex: m }));
        state.apply(&Transition::new(main, Op::MutexLock { mutex: m }));

        let bad = Transition::new(other, Op::MutexUnlock { mutex: m });
        assert_eq!(
            bad.status(&state),
            TransitionStatus::Undefined("unlocking a mutex held by another thread")
        );
    }

    #[test]
    fn double_init_is_admitted() {
        let (mut state, main, m) = state_with_mutex();
        state.apply(&Transition::new(main, Op::MutexInit { mutex: m }));
        let again = Transition::new(main, Op::MutexInit { mutex: m });
        assert!(again.enabled(&state));
        state.apply(&again);
        assert!(state.mutex(m).is_unlocked());
    }

    #[test]
    fn sem_wait_blocks_at_zero_and_wakes_on_post() {
        let mut state = ProgramState::with_main_thread();
        let s = state.add_object(VisibleObject::Semaphore(
            crate::model::object::SemaphoreObject::uninitialized(),
        ));
        state.apply(&Transition::new(
            RunnerId::MAIN,
            Op::SemInit { sem: s, count: 0 },
        ));

        let wait = Transition::new(RunnerId::MAIN, Op::SemWait { sem: s, available: 0 });
        assert_eq!(wait.status(&state), TransitionStatus::Blocked);

        state.apply(&Transition::new(RunnerId::MAIN, Op::SemPost { sem: s }));
        assert!(wait.enabled(&state));
    }

    #[test]
    fn sem_wait_equality_ignores_observed_count() {
        let a = Op::SemWait {
            sem: ObjectId::new(1),
            available: 0,
        };
        let b = Op::SemWait {
            sem: ObjectId::new(1),
            available: 3,
        };
        assert_eq!(a, b);
    }

    #[test]
    fn cond_wait_releases_mutex_and_awake_reacquires() {
        let mut state = ProgramState::with_main_thread();
        let waiter = state.add_runner(ThreadState::Running);
        let m = state.add_object(VisibleObject::Mutex(MutexObject::uninitialized()));
        let c = state.add_object(VisibleObject::Cond(
            crate::model::object::CondObject::uninitialized(),
        ));

        state.apply(&Transition::new(waiter, Op::MutexInit { mutex: m }));
        state.apply(&Transition::new(waiter, Op::CondInit { cond: c }));
        state.apply(&Transition::new(waiter, Op::MutexLock { mutex: m }));

        let enqueue = Transition::new(waiter, Op::CondEnqueue { cond: c, mutex: m });
        assert!(enqueue.enabled(&state));
        state.apply(&enqueue);
        assert!(state.mutex(m).is_unlocked());
        assert_eq!(state.thread(waiter).state, ThreadState::Sleeping);

        // Not signalled yet.
        let awake = Transition::new(waiter, Op::CondAwake { cond: c, mutex: m });
        assert_eq!(awake.status(&state), TransitionStatus::Blocked);

        state.apply(&Transition::new(RunnerId::MAIN, Op::CondSignal { cond: c }));
        assert!(awake.enabled(&state));
        state.apply(&awake);
        assert_eq!(state.mutex(m).holder(), Some(waiter));
        assert_eq!(state.thread(waiter).state, ThreadState::Running);
        assert!(!state.cond(c).has_waiters());
    }

    #[test]
    fn join_enabled_only_after_exit() {
        let mut state = ProgramState::with_main_thread();
        let child = state.add_runner(ThreadState::Embryo);
        state.set_pending(child, Transition::thread_start(child));
        state.apply(&Transition::new(
            RunnerId::MAIN,
            Op::ThreadCreate { child },
        ));

        let join = Transition::new(RunnerId::MAIN, Op::ThreadJoin { target: child });
        assert_eq!(join.status(&state), TransitionStatus::Blocked);

        state.apply(&Transition::thread_start(child));
        state.apply(&Transition::new(child, Op::ThreadExit));
        assert!(join.enabled(&state));
    }

    #[test]
    fn clone_in_preserves_the_action() {
        let (mut state, main, m) = state_with_mutex();
        state.apply(&Transition::new(main, Op::MutexInit { mutex: m }));
        let lock = Transition::new(main, Op::MutexLock { mutex: m });

        let copy = state.clone();
        let rebound = lock.clone_in(&copy);
        assert_eq!(rebound, lock);
        assert!(rebound.enabled(&copy));
    }

    #[test]
    fn display_is_pthread_flavored() {
        let t = Transition::new(
            RunnerId::new(2),
            Op::CondEnqueue {
                cond: ObjectId::new(1),
                mutex: ObjectId::new(0),
            },
        );
        assert_eq!(t.to_string(), "pthread_cond_wait(1, 0) (asleep)");
    }
}
