//! Case-management execution engine.
//!
//! A case instance is a tree of activity executions (the case plan, stages,
//! tasks and milestones) advanced by commands and by declarative join rules
//! called sentries. The crate is split the same way throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (lifecycle state machine, sentry
//!   joins, variable scopes, model invariants). No I/O.
//! - **[`engine`]**: The runtime: case instances, the command work-list, event
//!   routing and the termination cascade.
//! - **[`io`]**: Side-effecting helpers (config and model files).
//!
//! [`model`] holds the static case model shared by every instance of a
//! definition.

pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod model;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use engine::{CaseEngine, EngineError, EngineResult};
pub use model::{CaseModel, CompiledModel};
