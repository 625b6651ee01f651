//! Configuration for the DPOR search.
//!
//! `CheckerConfig` uses a fluent, move-based builder style: each method
//! consumes `self` and returns an updated configuration so options chain
//! safely.
//!
//! ```ignore
//! use mcmini::checker::CheckerConfig;
//!
//! let config = CheckerConfig::new()
//!     .max_depth_per_thread(Some(200))
//!     .first_deadlock(true);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Knobs of the exploration driver.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Bound on the number of transitions any single runner may execute
    /// within one trace. `None` means unbounded.
    pub max_depth_per_thread: Option<usize>,
    /// Stop exploring after the first deadlock is found.
    pub first_deadlock: bool,
    /// Stop exploring when undefined behavior is found; otherwise the
    /// offending branch is pruned and exploration continues.
    pub halt_on_undefined_behavior: bool,
    /// Bound on the number of maximal traces to explore. `None` means
    /// exhaustive.
    pub max_traces: Option<u64>,
    /// Maintain the starvation markers on thread objects.
    pub check_forward_progress: bool,
    cancel: Arc<AtomicBool>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            max_depth_per_thread: None,
            first_deadlock: false,
            halt_on_undefined_behavior: true,
            max_traces: None,
            check_forward_progress: false,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl CheckerConfig {
    /// The default configuration: exhaustive, halting on undefined
    /// behavior, no depth bound.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-thread transition depth bound.
    #[must_use]
    pub fn max_depth_per_thread(mut self, bound: Option<usize>) -> Self {
        self.max_depth_per_thread = bound;
        self
    }

    /// Stop after the first deadlock.
    #[must_use]
    pub fn first_deadlock(mut self, stop: bool) -> Self {
        self.first_deadlock = stop;
        self
    }

    /// Halt exploration when undefined behavior is found.
    #[must_use]
    pub fn halt_on_undefined_behavior(mut self, halt: bool) -> Self {
        self.halt_on_undefined_behavior = halt;
        self
    }

    /// Bound the number of maximal traces to explore.
    #[must_use]
    pub fn max_traces(mut self, bound: Option<u64>) -> Self {
        self.max_traces = bound;
        self
    }

    /// Maintain starvation markers on thread objects.
    #[must_use]
    pub fn check_forward_progress(mut self, check: bool) -> Self {
        self.check_forward_progress = check;
        self
    }

    /// A handle that cancels the exploration when set. The driver checks
    /// it at each backtrack decision; a mid-mailbox handshake is never
    /// interrupted.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// True once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}
