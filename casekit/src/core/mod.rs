//! Deterministic, pure logic shared by the case engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod invariants;
pub mod lifecycle;
pub mod sentry;
pub mod types;
pub mod variables;
