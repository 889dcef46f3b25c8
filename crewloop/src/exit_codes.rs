//! Stable exit codes for crewloop CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config, missing credentials, or any other runtime error.
pub const INVALID: i32 = 1;
/// `crewloop develop` spent every attempt without a passing test.
pub const EXHAUSTED: i32 = 2;
