//! Stable exit codes for `adw` commands.

/// The run succeeded, or a listing/check completed.
pub const OK: i32 = 0;
/// The run finished without success (iterations exhausted or coder aborted).
pub const FAILED: i32 = 1;
/// Invalid descriptor, configuration or command line.
pub const INVALID: i32 = 2;
