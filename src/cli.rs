//! Semantic exit codes for the mcmini binary.
//!
//! Codes follow common conventions and stay in the valid 0-125 range.
//! Finding a violation in the *target* is a distinct outcome from a
//! failure of the checker itself.

/// Semantic exit codes.
pub struct ExitCode;

impl ExitCode {
    /// Exploration completed and found no violations.
    pub const SUCCESS: i32 = 0;

    /// User error: bad arguments, missing target, unlaunchable process.
    pub const USER_ERROR: i32 = 1;

    /// Fatal checker error: dead process mid-trace, decode failure,
    /// replay divergence, timeout.
    pub const FATAL_ERROR: i32 = 2;

    /// Internal error: a bug in the checker itself.
    pub const INTERNAL_ERROR: i32 = 3;

    /// Exploration was cancelled.
    pub const CANCELLED: i32 = 4;

    // Verification outcomes (10-125)

    /// At least one deadlock was found in the target.
    pub const DEADLOCK_FOUND: i32 = 10;

    /// Undefined synchronization usage was found in the target.
    pub const UNDEFINED_BEHAVIOR_FOUND: i32 = 11;

    /// A possible starvation was found in the target.
    pub const STARVATION_FOUND: i32 = 12;

    /// Human-readable description of an exit code.
    #[must_use]
    pub const fn description(code: i32) -> &'static str {
        match code {
            0 => "success",
            1 => "user error (invalid input/arguments)",
            2 => "fatal checker error",
            3 => "internal error (bug)",
            4 => "cancelled",
            10 => "deadlock found",
            11 => "undefined behavior found",
            12 => "possible starvation found",
            _ => "unknown",
        }
    }
}
