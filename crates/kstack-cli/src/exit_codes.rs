//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.
//! A failed external command passes its own exit code through instead.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Usage error - invalid arguments or input files (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;

/// Configuration error - missing environment variable or config key (`EX_CONFIG`)
pub const CONFIG_ERROR: i32 = 78;
