//! Stable exit codes for stager CLI commands.

/// Command succeeded (including runs skipped because of an empty query).
pub const OK: i32 = 0;
/// Invalid config, usage, or filesystem errors.
pub const INVALID: i32 = 1;
/// The flow exited non-zero or could not be spawned.
pub const FLOW_FAILED: i32 = 2;
/// The flow was killed after exceeding `flow.timeout_secs`.
pub const TIMED_OUT: i32 = 3;
