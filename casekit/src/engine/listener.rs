//! Lifecycle listeners.
//!
//! Listeners run synchronously on every lifecycle event, inside the command
//! that caused it. They see the case instance scope, so writes made on an
//! exit deep inside a stage are visible case-wide once the command returns.

use thiserror::Error;

use crate::core::types::{ActivityKind, ExecutionId, StandardEvent};
use crate::core::variables::VariableScope;
use crate::model::ListenerDecl;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ListenerError {
    pub message: String,
}

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Lifecycle event as seen by listeners.
#[derive(Debug, Clone, Copy)]
pub struct ListenerEvent<'a> {
    pub execution: ExecutionId,
    pub activity_id: &'a str,
    pub kind: ActivityKind,
    pub event: StandardEvent,
}

/// Programmatic listener registered on the engine.
///
/// Returning an error aborts the whole command.
pub trait LifecycleListener: Send + Sync {
    fn notify(&self, event: &ListenerEvent<'_>, case: &mut VariableScope)
    -> Result<(), ListenerError>;
}

/// Run the model-declared listeners of an activity for `event`.
///
/// Returns whether any variable changed value.
pub(crate) fn apply_declared(
    declared: &[ListenerDecl],
    event: StandardEvent,
    case: &mut VariableScope,
) -> bool {
    let mut changed = false;
    for listener in declared.iter().filter(|listener| listener.event == event) {
        let value = &listener.set_variable.value;
        let previous = case.set(listener.set_variable.name.clone(), value.clone());
        changed |= previous.as_ref() != Some(value);
    }
    changed
}
