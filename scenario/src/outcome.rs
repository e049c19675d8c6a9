use serde::{Deserialize, Serialize};

use crate::harness::ScriptReport;
use crate::judge::Judgment;

/// Classified result of one scenario run, ordered from best to worst.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Fail,
    Error,
}

pub fn classify_outcome(script: &ScriptReport, judgment: &Judgment) -> Outcome {
    if script.failure.is_some() {
        return Outcome::Error;
    }
    if judgment.checks.iter().all(|check| check.passed()) {
        Outcome::Success
    } else {
        Outcome::Fail
    }
}
