//! Errors surfaced by engine commands.

use thiserror::Error;

use crate::core::lifecycle::TransitionError;
use crate::core::types::{ExecutionId, StandardEvent, State};

#[derive(Debug, Error)]
pub enum EngineError {
    /// The command targets an execution that is not in a legal source state.
    #[error("case execution {id} ({activity_id}) is {state}: {reason}")]
    InvalidState {
        id: ExecutionId,
        activity_id: String,
        state: State,
        reason: String,
    },

    /// The execution no longer exists (closed) or never existed.
    #[error("case execution {0} not found")]
    UnknownNode(ExecutionId),

    #[error("case definition '{0}' is not deployed")]
    UnknownDefinition(String),

    #[error("case definition '{0}' is already deployed")]
    DuplicateDefinition(String),

    #[error("invalid case model: {}", .0.join("; "))]
    InvalidModel(Vec<String>),

    /// An if-part could not be evaluated; the sentry did not fire.
    #[error("if-part of sentry '{sentry}' on {target} failed: {message}")]
    GuardEvaluation {
        sentry: String,
        target: ExecutionId,
        message: String,
    },

    #[error("listener for {event} on '{activity_id}' failed: {message}")]
    Listener {
        activity_id: String,
        event: StandardEvent,
        message: String,
    },

    #[error("cascade exceeded {limit} steps")]
    CascadeLimit { limit: usize },
}

impl EngineError {
    pub(crate) fn invalid_transition(
        id: ExecutionId,
        activity_id: &str,
        err: TransitionError,
    ) -> Self {
        EngineError::InvalidState {
            id,
            activity_id: activity_id.to_string(),
            state: err.from,
            reason: err.to_string(),
        }
    }

    pub(crate) fn invalid_state(
        id: ExecutionId,
        activity_id: &str,
        state: State,
        reason: impl Into<String>,
    ) -> Self {
        EngineError::InvalidState {
            id,
            activity_id: activity_id.to_string(),
            state,
            reason: reason.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
