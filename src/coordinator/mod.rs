//! The coordinator: the model-to-system bridge.
//!
//! The coordinator owns the current program state, the current process
//! handle, the transition registry, and the address map. It is the only
//! party that may force a new target process and advance a runner, and it
//! is passed explicitly to whoever needs it; there is no global instance.
//!
//! Driving a runner is a three-beat step: release the runner over the
//! mailbox, apply its pending transition to the model, then decode the
//! newly announced request into the runner's next pending transition.
//! Traversing upward in the search happens only through [`Coordinator::reset_to`],
//! which discards the process, asks the source for a fresh one, and
//! replays a recorded prefix while asserting the target reproduces it.

pub mod map;
pub mod registry;

pub use map::{AddressMap, ModelToSystemMap};
pub use registry::{default_registry, DecodeFn, TransitionRegistry};

use crate::model::state::ProgramState;
use crate::model::transition::Transition;
use crate::remote::mailbox::{DecodeError, RuntimeTypeId};
use crate::remote::process::{ProcessError, ProcessHandle, ProcessSource, SpawnError};
use crate::types::RunnerId;
use tracing::trace;

/// Failure while executing a runner or replaying a prefix. All variants
/// are fatal to exploration.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The runner has no pending transition (it exited, or never existed).
    #[error("runner {0} has no pending transition")]
    NoPendingTransition(RunnerId),

    /// The process source could not produce a new process.
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// The live process failed or died unexpectedly.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The target announced a type id nothing was registered for before
    /// model checking began.
    #[error(
        "no decode callback registered for runtime type id {0}; the coordinator was \
         misconfigured before launch"
    )]
    UnknownTransitionType(RuntimeTypeId),

    /// The announced payload could not be interpreted.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// During replay, a produced transition did not equal the recorded
    /// one: the target is non-deterministic outside the tracked
    /// vocabulary, or the stable-handle assumption broke.
    #[error(
        "replay diverged at step {step}: expected thread {runner}: {expected}, produced {actual}"
    )]
    ReplayDivergence {
        /// Index into the replayed prefix.
        step: usize,
        /// The runner scheduled at that step.
        runner: RunnerId,
        /// Rendering of the recorded transition.
        expected: String,
        /// Rendering of the transition the re-execution produced.
        actual: String,
    },
}

/// Owner of the current program model and the current target process.
pub struct Coordinator {
    initial: ProgramState,
    state: ProgramState,
    addresses: AddressMap,
    registry: TransitionRegistry,
    source: Box<dyn ProcessSource>,
    handle: Option<Box<dyn ProcessHandle>>,
}

impl Coordinator {
    /// Build a coordinator and force the first target process.
    ///
    /// `initial` is the model of the program at its committed starting
    /// point; for a fork source that is [`ProgramState::with_main_thread`].
    ///
    /// # Errors
    ///
    /// [`SpawnError`] if the first process cannot be launched.
    pub fn new(
        initial: ProgramState,
        registry: TransitionRegistry,
        mut source: Box<dyn ProcessSource>,
    ) -> Result<Self, SpawnError> {
        let handle = source.force_new_process()?;
        Ok(Self {
            state: initial.clone(),
            initial,
            addresses: AddressMap::new(),
            registry,
            source,
            handle: Some(handle),
        })
    }

    /// The current program state.
    #[must_use]
    pub fn state(&self) -> &ProgramState {
        &self.state
    }

    /// Drive `runner` one step: execute its pending transition in the
    /// target, apply it to the model, and decode the next announcement
    /// into the new pending transition. Returns the applied transition.
    ///
    /// Afterwards the trace ends with the returned transition, and the
    /// runner's pending transition reflects the new interception request
    /// (or the runner is removed from the pending map after its exit).
    ///
    /// # Errors
    ///
    /// [`ExecutionError`] on any process, registry, or decode failure.
    /// A dead process observed while executing the main runner's exit is
    /// the expected end of the target, not an error.
    pub fn execute_runner(&mut self, runner: RunnerId) -> Result<Transition, ExecutionError> {
        let pending = self
            .state
            .pending(runner)
            .cloned()
            .ok_or(ExecutionError::NoPendingTransition(runner))?;
        let exits = pending.is_thread_exit();

        let handle = self
            .handle
            .as_mut()
            .ok_or(ProcessError::DeadProcess)?;

        trace!(%runner, transition = %pending, "executing runner");
        match handle.execute_runner(runner) {
            Ok(msg) => {
                let applied = self.state.apply(&pending).clone();
                if exits {
                    self.state.clear_pending(runner);
                } else {
                    let decode = self
                        .registry
                        .get(msg.type_id)
                        .ok_or(ExecutionError::UnknownTransitionType(msg.type_id))?;
                    let next = decode(
                        runner,
                        &msg,
                        &mut ModelToSystemMap::new(&mut self.addresses, &mut self.state),
                    )?;
                    self.state.set_pending(runner, next);
                }
                self.debug_check_invariants();
                Ok(applied)
            }
            Err(ProcessError::DeadProcess) if exits && runner.is_main() => {
                // The target exited with its main thread, as modeled.
                self.handle = None;
                let applied = self.state.apply(&pending).clone();
                self.state.clear_pending(runner);
                self.debug_check_invariants();
                Ok(applied)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Discard the current process, force a fresh one, and replay the
    /// given prefix, asserting each produced transition equals the
    /// recorded one. This is the only legitimate way to traverse upward.
    ///
    /// # Errors
    ///
    /// [`ExecutionError::ReplayDivergence`] if the target does not
    /// reproduce the prefix; any error of [`Coordinator::execute_runner`]
    /// otherwise.
    pub fn reset_to(&mut self, prefix: &[(RunnerId, Transition)]) -> Result<(), ExecutionError> {
        trace!(steps = prefix.len(), "resetting to prefix");
        self.handle = None;
        self.handle = Some(self.source.force_new_process()?);
        self.state = self.initial.clone();
        self.addresses.clear();

        for (step, (runner, expected)) in prefix.iter().enumerate() {
            let produced = self.execute_runner(*runner)?;
            if produced != *expected {
                return Err(ExecutionError::ReplayDivergence {
                    step,
                    runner: *runner,
                    expected: expected.to_string(),
                    actual: produced.to_string(),
                });
            }
        }
        Ok(())
    }

    fn debug_check_invariants(&self) {
        #[cfg(debug_assertions)]
        {
            let violations = self.state.check_invariants();
            debug_assert!(violations.is_empty(), "state invariants broken: {violations:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mailbox::MailboxMessage;

    /// A source whose processes die before the first interception point.
    struct StillbornSource;

    struct StillbornHandle;

    impl ProcessHandle for StillbornHandle {
        fn execute_runner(&mut self, _runner: RunnerId) -> Result<MailboxMessage, ProcessError> {
            Err(ProcessError::DeadProcess)
        }
    }

    impl ProcessSource for StillbornSource {
        fn force_new_process(&mut self) -> Result<Box<dyn ProcessHandle>, SpawnError> {
            Ok(Box::new(StillbornHandle))
        }
    }

    #[test]
    fn unexpected_process_death_is_fatal() {
        let mut coordinator = Coordinator::new(
            ProgramState::with_main_thread(),
            default_registry(),
            Box::new(StillbornSource),
        )
        .expect("spawn");

        // Main's pending is thread_start, not an exit, so a dead process
        // is an error.
        let err = coordinator.execute_runner(RunnerId::MAIN).expect_err("dead");
        assert!(matches!(
            err,
            ExecutionError::Process(ProcessError::DeadProcess)
        ));
    }

    #[test]
    fn executing_an_exited_runner_is_rejected() {
        let mut coordinator = Coordinator::new(
            ProgramState::new(),
            default_registry(),
            Box::new(StillbornSource),
        )
        .expect("spawn");

        let err = coordinator
            .execute_runner(RunnerId::new(3))
            .expect_err("no such runner");
        assert!(matches!(err, ExecutionError::NoPendingTransition(_)));
    }
}
