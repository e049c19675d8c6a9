//! Sentry join bookkeeping.
//!
//! A [`SentryInstance`] records which on-parts of one sentry declaration have
//! fired for one target execution. Join evaluation is pure: the declaration's
//! on-part list and join type decide whether the recorded set satisfies it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::types::{JoinType, StandardEvent};
use crate::model::{OnPart, SentryDeclaration};

/// Runtime state of one sentry declaration for one target execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentryInstance {
    /// Indices into the declaration's `on_parts` that have fired.
    pub satisfied: BTreeSet<usize>,
    /// Set once the sentry fired; later on-part arrivals are ignored.
    pub fired: bool,
}

impl SentryInstance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every on-part of `declaration` matching `(source, event)`.
    ///
    /// Returns true if at least one on-part matched. Fired instances never
    /// change.
    pub fn record(
        &mut self,
        declaration: &SentryDeclaration,
        source: &str,
        event: StandardEvent,
    ) -> bool {
        if self.fired {
            return false;
        }
        let mut matched = false;
        for (index, part) in declaration.on_parts.iter().enumerate() {
            if part.matches(source, event) {
                self.satisfied.insert(index);
                matched = true;
            }
        }
        matched
    }

    /// True if the on-part join condition holds (the if-part is not considered).
    pub fn is_joined(&self, declaration: &SentryDeclaration) -> bool {
        is_joined(&declaration.on_parts, declaration.join, &self.satisfied)
    }

    /// True if the join holds but the sentry has not fired yet.
    pub fn is_pending(&self, declaration: &SentryDeclaration) -> bool {
        !self.fired && self.is_joined(declaration)
    }
}

/// Join condition over on-part indices.
///
/// A sentry without on-parts is an if-part-only sentry and is always joined.
pub fn is_joined(on_parts: &[OnPart], join: JoinType, satisfied: &BTreeSet<usize>) -> bool {
    if on_parts.is_empty() {
        return true;
    }
    match join {
        JoinType::And => (0..on_parts.len()).all(|index| satisfied.contains(&index)),
        JoinType::Or => !satisfied.is_empty(),
    }
}
