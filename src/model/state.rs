//! The program state: visible objects, runners, pending map, and trace.
//!
//! `ProgramState` is the single owner of every visible object; everything
//! else refers to objects by id. The pending map sends each live runner to
//! the transition it will execute next, and the trace records every
//! transition applied so far, in order.

use crate::model::object::{
    CondObject, MutexObject, MutexState, SemaphoreObject, ThreadObject, ThreadState, VisibleObject,
};
use crate::model::transition::{Op, Transition};
use crate::types::{ObjectId, RunnerId};

/// Snapshot of a whole modeled program: objects, threads, pending
/// transitions, and the applied trace.
///
/// Cloning is `O(|state|)` and produces a fully independent snapshot.
#[derive(Debug, Clone, Default)]
pub struct ProgramState {
    objects: Vec<VisibleObject>,
    threads: Vec<ThreadObject>,
    pending: Vec<Option<Transition>>,
    trace: Vec<Transition>,
}

impl ProgramState {
    /// An empty state with no objects and no runners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The state a program has at the start of `main`: one running thread
    /// (runner 0) whose pending transition is its `thread_start`.
    #[must_use]
    pub fn with_main_thread() -> Self {
        let mut state = Self::new();
        let main = state.add_runner(ThreadState::Running);
        state.set_pending(main, Transition::thread_start(main));
        state
    }

    /// Register a new visible object; returns its dense id.
    pub fn add_object(&mut self, object: VisibleObject) -> ObjectId {
        let id = ObjectId::new(u32::try_from(self.objects.len()).unwrap_or(u32::MAX));
        self.objects.push(object);
        id
    }

    /// Register a new runner in the given thread state; returns its id.
    pub fn add_runner(&mut self, initial: ThreadState) -> RunnerId {
        let id = RunnerId::new(u32::try_from(self.threads.len()).unwrap_or(u32::MAX));
        self.threads.push(ThreadObject::new(initial));
        self.pending.push(None);
        id
    }

    /// True iff `id` names a registered object.
    #[must_use]
    pub fn has_object(&self, id: ObjectId) -> bool {
        !id.is_invalid() && id.index() < self.objects.len()
    }

    /// True iff `id` names a registered runner.
    #[must_use]
    pub fn has_runner(&self, id: RunnerId) -> bool {
        id.index() < self.threads.len()
    }

    /// Number of registered runners.
    #[must_use]
    pub fn runner_count(&self) -> usize {
        self.threads.len()
    }

    /// The object with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not name a registered object.
    #[must_use]
    pub fn object(&self, id: ObjectId) -> &VisibleObject {
        &self.objects[id.index()]
    }

    /// The mutex with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not name a registered mutex.
    #[must_use]
    pub fn mutex(&self, id: ObjectId) -> &MutexObject {
        match &self.objects[id.index()] {
            VisibleObject::Mutex(m) => m,
            other => panic!("object {id} is a {}, not a mutex", other.kind_name()),
        }
    }

    pub(crate) fn mutex_mut(&mut self, id: ObjectId) -> &mut MutexObject {
        match &mut self.objects[id.index()] {
            VisibleObject::Mutex(m) => m,
            other => panic!("object {id} is a {}, not a mutex", other.kind_name()),
        }
    }

    /// The condition variable with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not name a registered condition variable.
    #[must_use]
    pub fn cond(&self, id: ObjectId) -> &CondObject {
        match &self.objects[id.index()] {
            VisibleObject::Cond(c) => c,
            other => panic!("object {id} is a {}, not a cond", other.kind_name()),
        }
    }

    pub(crate) fn cond_mut(&mut self, id: ObjectId) -> &mut CondObject {
        match &mut self.objects[id.index()] {
            VisibleObject::Cond(c) => c,
            other => panic!("object {id} is a {}, not a cond", other.kind_name()),
        }
    }

    /// The semaphore with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not name a registered semaphore.
    #[must_use]
    pub fn semaphore(&self, id: ObjectId) -> &SemaphoreObject {
        match &self.objects[id.index()] {
            VisibleObject::Semaphore(s) => s,
            other => panic!("object {id} is a {}, not a semaphore", other.kind_name()),
        }
    }

    pub(crate) fn semaphore_mut(&mut self, id: ObjectId) -> &mut SemaphoreObject {
        match &mut self.objects[id.index()] {
            VisibleObject::Semaphore(s) => s,
            other => panic!("object {id} is a {}, not a semaphore", other.kind_name()),
        }
    }

    /// The thread backing the given runner.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not name a registered runner.
    #[must_use]
    pub fn thread(&self, id: RunnerId) -> &ThreadObject {
        &self.threads[id.index()]
    }

    pub(crate) fn thread_mut(&mut self, id: RunnerId) -> &mut ThreadObject {
        &mut self.threads[id.index()]
    }

    /// Every registered runner, in id order.
    pub fn runners(&self) -> impl Iterator<Item = RunnerId> {
        (0..self.threads.len()).map(|i| RunnerId::new(i as u32))
    }

    /// The pending transition of a runner, if it has one.
    #[must_use]
    pub fn pending(&self, runner: RunnerId) -> Option<&Transition> {
        self.pending.get(runner.index()).and_then(Option::as_ref)
    }

    /// Install the next transition a runner will execute.
    ///
    /// Also maintains the waiter bookkeeping derived from the pending map:
    /// a pending `sem_wait` enters the semaphore's wait queue, a pending
    /// `pthread_join` marks the join target.
    pub fn set_pending(&mut self, runner: RunnerId, transition: Transition) {
        debug_assert_eq!(transition.executor, runner);
        match transition.op {
            Op::SemWait { sem, .. } => self.semaphore_mut(sem).enqueue_waiter(runner),
            Op::ThreadJoin { target } => self.thread_mut(target).joined_by = Some(runner),
            _ => {}
        }
        self.pending[runner.index()] = Some(transition);
    }

    /// Remove a runner from the pending map (after its thread exit).
    pub fn clear_pending(&mut self, runner: RunnerId) {
        self.pending[runner.index()] = None;
    }

    /// Apply a transition: mutate the objects it touches and append it to
    /// the trace. Returns the recorded trace entry.
    ///
    /// The caller must only apply enabled transitions (the trace
    /// invariant); debug builds assert it. For `sem_wait` the recorded
    /// entry captures the count available at application time, which the
    /// dependence relation consumes later.
    pub fn apply(&mut self, transition: &Transition) -> &Transition {
        let mut recorded = transition.clone();
        if let Op::SemWait { sem, available } = &mut recorded.op {
            *available = self.semaphore(*sem).count;
        }
        transition.execute(self);
        self.trace.push(recorded);
        &self.trace[self.trace.len() - 1]
    }

    /// The ordered sequence of applied transitions.
    #[must_use]
    pub fn trace(&self) -> &[Transition] {
        &self.trace
    }

    /// True iff the runner's pending transition exists and is enabled.
    #[must_use]
    pub fn runner_enabled(&self, runner: RunnerId) -> bool {
        self.pending(runner).is_some_and(|t| t.enabled(self))
    }

    /// Runners that can be scheduled now, in id order.
    ///
    /// Once the main thread has exited the target process is gone, so no
    /// runner is schedulable regardless of its pending transition.
    #[must_use]
    pub fn enabled_runners(&self) -> Vec<RunnerId> {
        if self.thread(RunnerId::MAIN).is_finished() {
            return Vec::new();
        }
        self.runners().filter(|r| self.runner_enabled(*r)).collect()
    }

    /// Runners that have not yet finished, in id order.
    #[must_use]
    pub fn unfinished_runners(&self) -> Vec<RunnerId> {
        self.runners()
            .filter(|r| !self.thread(*r).is_finished())
            .collect()
    }

    /// Pending transitions of all live runners, in id order.
    #[must_use]
    pub fn pending_snapshot(&self) -> Vec<(RunnerId, Transition)> {
        self.runners()
            .filter_map(|r| self.pending(r).map(|t| (r, t.clone())))
            .collect()
    }

    /// Check the cross-object invariants; returns a description of each
    /// violation found. Used by debug assertions and the test suite.
    #[must_use]
    pub fn check_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for (i, object) in self.objects.iter().enumerate() {
            let id = ObjectId::new(i as u32);
            match object {
                VisibleObject::Mutex(m) => {
                    // A held mutex names a registered holder that has run.
                    // A finished or cond-sleeping holder is possible in a
                    // real target (exiting while holding leaks the lock;
                    // waiting on one variable can happen while holding an
                    // unrelated mutex), so only an embryo holder is
                    // impossible.
                    if let MutexState::LockedBy(holder) = m.state {
                        if !self.has_runner(holder) {
                            violations
                                .push(format!("mutex {id} held by unknown runner {holder}"));
                        } else if matches!(self.thread(holder).state, ThreadState::Embryo) {
                            violations.push(format!(
                                "mutex {id} held by runner {holder} that never started"
                            ));
                        }
                    }
                }
                VisibleObject::Cond(c) => {
                    for waiter in c.queued() {
                        let waits_here = self.pending(waiter).is_some_and(|t| {
                            matches!(t.op, Op::CondAwake { cond, .. } if cond == id)
                        });
                        if !waits_here {
                            violations.push(format!(
                                "cond {id} queues runner {waiter} whose pending transition \
                                 is not an awake on it"
                            ));
                        }
                    }
                }
                VisibleObject::Semaphore(s) => {
                    for runner in self.runners() {
                        let pending_wait = self.pending(runner).is_some_and(
                            |t| matches!(t.op, Op::SemWait { sem, .. } if sem == id),
                        );
                        if pending_wait != s.is_waiting(runner) {
                            violations.push(format!(
                                "semaphore {id} wait-queue disagrees with runner {runner}'s \
                                 pending transition"
                            ));
                        }
                    }
                }
            }
        }

        for runner in self.runners() {
            if self.thread(runner).is_finished() && self.pending(runner).is_some() {
                violations.push(format!("finished runner {runner} still has a pending transition"));
            }
        }

        violations
    }
}
