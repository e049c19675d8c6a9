//! If-part evaluation.
//!
//! The engine only depends on [`GuardEvaluator`]; the expression language is
//! chosen by whoever constructs the engine. [`ExpressionEvaluator`] is the
//! default and evaluates Jinja-style expressions (`value > 99`,
//! `approved and amount < 1000`) with minijinja.

use minijinja::value::ValueKind;
use minijinja::{Environment, UndefinedBehavior};
use thiserror::Error;

use crate::core::variables::Variables;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GuardError {
    pub message: String,
}

impl GuardError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Evaluate an if-part expression against the variables visible to a sentry.
pub trait GuardEvaluator {
    fn evaluate(&self, expression: &str, variables: &Variables) -> Result<bool, GuardError>;
}

/// Default evaluator backed by minijinja expressions.
#[derive(Debug, Clone)]
pub struct ExpressionEvaluator {
    strict_undefined: bool,
}

impl ExpressionEvaluator {
    /// `strict_undefined` turns references to missing variables into errors.
    pub fn new(strict_undefined: bool) -> Self {
        Self { strict_undefined }
    }
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new(true)
    }
}

impl GuardEvaluator for ExpressionEvaluator {
    fn evaluate(&self, expression: &str, variables: &Variables) -> Result<bool, GuardError> {
        let mut env = Environment::new();
        if self.strict_undefined {
            env.set_undefined_behavior(UndefinedBehavior::Strict);
        }
        let compiled = env
            .compile_expression(expression)
            .map_err(|err| GuardError::new(format!("compile `{expression}`: {err}")))?;
        let value = compiled
            .eval(variables)
            .map_err(|err| GuardError::new(format!("evaluate `{expression}`: {err}")))?;

        match value.kind() {
            ValueKind::Bool => Ok(value.is_true()),
            ValueKind::Undefined if self.strict_undefined => Err(GuardError::new(format!(
                "`{expression}` references an undefined variable"
            ))),
            ValueKind::Undefined | ValueKind::None => Ok(false),
            other => Err(GuardError::new(format!(
                "`{expression}` evaluated to {other:?}, expected a boolean"
            ))),
        }
    }
}
