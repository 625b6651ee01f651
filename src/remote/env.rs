//! Environment variables consumed by the in-target interposition library.
//!
//! The coordinator sets these when launching a target; the library reads
//! them before `main` runs. The core never reads them back itself.

/// Name of the POSIX shared-memory object holding the mailbox region.
pub const ENV_SHM_NAME: &str = "MCMINI_SHM_NAME";

/// Maximum number of runners the mailbox region has slots for.
pub const ENV_MAX_RUNNERS: &str = "MCMINI_MAX_RUNNERS";

/// Per-thread transition depth bound, forwarded for diagnostics.
pub const ENV_MAX_DEPTH_PER_THREAD: &str = "MCMINI_MAX_DEPTH_PER_THREAD";

/// Ask the library to print when a given trace id is reached.
pub const ENV_PRINT_AT_TRACE_ID: &str = "MCMINI_PRINT_AT_TRACE_ID";

/// Stop at the first deadlock found.
pub const ENV_FIRST_DEADLOCK: &str = "MCMINI_FIRST_DEADLOCK";

/// Enable the forward-progress (starvation) bookkeeping.
pub const ENV_CHECK_FORWARD_PROGRESS: &str = "MCMINI_CHECK_FORWARD_PROGRESS";

/// Suppress non-essential library output.
pub const ENV_QUIET: &str = "MCMINI_QUIET";

/// Verbose library output.
pub const ENV_VERBOSE: &str = "MCMINI_VERBOSE";
