//! Process source and handle abstractions.
//!
//! A [`ProcessSource`] is a factory yielding fresh target processes
//! committed to a known initial state: forked from the beginning, or (a
//! future variant) resumed from a checkpoint image. A [`ProcessHandle`]
//! drives one live process runner-by-runner over the mailbox and
//! terminates the process when dropped.

use crate::remote::mailbox::MailboxMessage;
use crate::types::RunnerId;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Failure to produce a new target process. Always fatal to exploration.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// The target executable does not exist.
    #[error("target executable not found: {0}")]
    TargetNotFound(PathBuf),

    /// The interposition library to preload does not exist.
    #[error("interposition library not found: {0}")]
    InterposeLibraryNotFound(PathBuf),

    /// Any other launch failure.
    #[error("failed to launch target process: {0}")]
    Io(#[from] io::Error),
}

/// Failure while driving a live target process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The process exited before reaching the next interception point.
    ///
    /// Expected once, right after the main thread's exit transition;
    /// anywhere else it is fatal.
    #[error("target process exited before reaching an interception point")]
    DeadProcess,

    /// The per-step wait on the mailbox elapsed.
    #[error("timed out after {limit:?} waiting for runner {runner}")]
    Timeout {
        /// The runner that never posted "done".
        runner: RunnerId,
        /// The configured per-step limit.
        limit: Duration,
    },

    /// Mailbox or process-management I/O failure.
    #[error("process I/O: {0}")]
    Io(#[from] io::Error),
}

/// A live target process under the coordinator's scheduling.
///
/// Dropping a handle terminates the process.
pub trait ProcessHandle {
    /// Release the given runner, block until it reaches its next
    /// interception point (or exits), and return its announced request.
    ///
    /// The coordinator never signals two runners concurrently: a call must
    /// complete before the next one is made.
    ///
    /// # Errors
    ///
    /// [`ProcessError::DeadProcess`] if the process terminated,
    /// [`ProcessError::Timeout`] if a per-step limit is configured and
    /// elapsed, [`ProcessError::Io`] for anything else.
    fn execute_runner(&mut self, runner: RunnerId) -> Result<MailboxMessage, ProcessError>;
}

/// A factory for fresh target processes.
pub trait ProcessSource {
    /// Produce a new process committed to the source's initial state.
    ///
    /// # Errors
    ///
    /// [`SpawnError`] if the target cannot be launched.
    fn force_new_process(&mut self) -> Result<Box<dyn ProcessHandle>, SpawnError>;
}
