//! Fork-and-exec process source.
//!
//! Launches the target executable with the interposition library
//! preloaded. The library opens the mailbox region named in the
//! environment, announces each intercepted call, and parks every thread
//! on its slot's "go" semaphore, so a fresh process is committed to the
//! very beginning of `main`.

use crate::remote::env;
use crate::remote::mailbox::{MailboxMessage, MailboxRegion};
use crate::remote::process::{ProcessError, ProcessHandle, ProcessSource, SpawnError};
use crate::types::RunnerId;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Process-wide counter keeping shared-memory object names unique across
/// sources.
static SHM_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Default number of mailbox slots (and therefore runners) per process.
pub const DEFAULT_MAX_RUNNERS: usize = 64;

/// A [`ProcessSource`] that forks and execs the target executable.
#[derive(Debug, Clone)]
pub struct ForkProcessSource {
    target: PathBuf,
    args: Vec<OsString>,
    preload: PathBuf,
    max_runners: usize,
    step_timeout: Option<Duration>,
    extra_env: Vec<(String, String)>,
    spawned: u64,
}

impl ForkProcessSource {
    /// A source launching `target` with the interposition library at
    /// `preload`.
    #[must_use]
    pub fn new(target: impl Into<PathBuf>, preload: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            args: Vec::new(),
            preload: preload.into(),
            max_runners: DEFAULT_MAX_RUNNERS,
            step_timeout: None,
            extra_env: Vec::new(),
            spawned: 0,
        }
    }

    /// Arguments passed to the target.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Number of mailbox slots each process is created with.
    #[must_use]
    pub fn max_runners(mut self, slots: usize) -> Self {
        self.max_runners = slots;
        self
    }

    /// Per-step limit on waiting for a runner to reach an interception
    /// point. `None` waits forever.
    #[must_use]
    pub fn step_timeout(mut self, limit: Option<Duration>) -> Self {
        self.step_timeout = limit;
        self
    }

    /// Extra environment variables for the target (forwarded verbatim;
    /// the in-target library reads the `MCMINI_*` family).
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.push((key.into(), value.into()));
        self
    }
}

impl ProcessSource for ForkProcessSource {
    fn force_new_process(&mut self) -> Result<Box<dyn ProcessHandle>, SpawnError> {
        if !self.preload.exists() {
            return Err(SpawnError::InterposeLibraryNotFound(self.preload.clone()));
        }

        let sequence = SHM_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let shm_name = format!("/mcmini-{}-{sequence}", std::process::id());
        self.spawned += 1;
        let region = MailboxRegion::create(&shm_name, self.max_runners)?;

        let mut command = Command::new(&self.target);
        command
            .args(&self.args)
            .env("LD_PRELOAD", &self.preload)
            .env(env::ENV_SHM_NAME, region.name())
            .env(env::ENV_MAX_RUNNERS, self.max_runners.to_string())
            .stdin(Stdio::null());
        for (key, value) in &self.extra_env {
            command.env(key, value);
        }

        let child = command.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SpawnError::TargetNotFound(self.target.clone()),
            _ => SpawnError::Io(e),
        })?;

        debug!(
            pid = child.id(),
            spawn = self.spawned,
            shm = %shm_name,
            "launched target process"
        );
        Ok(Box::new(ForkProcessHandle {
            child,
            region,
            step_timeout: self.step_timeout,
        }))
    }
}

/// Handle to one forked target process.
struct ForkProcessHandle {
    child: Child,
    region: MailboxRegion,
    step_timeout: Option<Duration>,
}

impl ForkProcessHandle {
    fn process_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }
}

impl ProcessHandle for ForkProcessHandle {
    fn execute_runner(&mut self, runner: RunnerId) -> Result<MailboxMessage, ProcessError> {
        if runner.index() >= self.region.slots() {
            return Err(ProcessError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("runner {runner} exceeds the mailbox slot count"),
            )));
        }
        if self.process_exited() {
            return Err(ProcessError::DeadProcess);
        }

        self.region.post_go(runner);
        match self.region.wait_done(runner, self.step_timeout) {
            Ok(msg) => Ok(msg),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => {
                if self.process_exited() {
                    Err(ProcessError::DeadProcess)
                } else {
                    Err(ProcessError::Timeout {
                        runner,
                        limit: self.step_timeout.unwrap_or_default(),
                    })
                }
            }
            Err(err) => Err(ProcessError::Io(err)),
        }
    }
}

impl Drop for ForkProcessHandle {
    fn drop(&mut self) {
        if !self.process_exited() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
        debug!("released target process");
    }
}
