//! Stable exit codes for tracker CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config, scenario or arguments.
pub const INVALID: i32 = 1;
/// Replay stopped on an unrecoverable fault.
pub const FAULT: i32 = 2;
