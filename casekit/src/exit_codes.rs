//! Stable exit codes for the `casekit` and `scenario` binaries.

/// Command succeeded (model valid, scenario checks passed).
pub const OK: i32 = 0;
/// Invalid input: unreadable or invalid model, config or scenario file.
pub const INVALID: i32 = 1;
/// A scenario ran to the end but at least one check failed.
pub const FAILED: i32 = 2;
/// A scenario step was rejected by the engine.
pub const ERROR: i32 = 3;
