//! Check execution and outcome recording.
//!
//! Observes the engine once the step script has run and records, per check,
//! what was expected next to what was observed.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use casekit::CaseEngine;
use casekit::core::types::{ExecutionId, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::scenario::Check;

/// Collected check outcomes for a run.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Judgment {
    pub checks: Vec<CheckOutcome>,
}

/// Result of running a single check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckOutcome {
    Absent {
        activity: String,
        passed: bool,
        observed: Option<State>,
    },
    State {
        activity: String,
        passed: bool,
        expected: State,
        observed: Option<State>,
    },
    Variable {
        name: String,
        activity: Option<String>,
        passed: bool,
        expected: Value,
        observed: Option<Value>,
    },
    TaskCount {
        passed: bool,
        expected: usize,
        observed: usize,
    },
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        match self {
            CheckOutcome::Absent { passed, .. }
            | CheckOutcome::State { passed, .. }
            | CheckOutcome::Variable { passed, .. }
            | CheckOutcome::TaskCount { passed, .. } => *passed,
        }
    }

    /// Stable label used to aggregate pass rates across runs.
    pub fn label(&self) -> String {
        match self {
            CheckOutcome::Absent { activity, .. } => format!("absent({activity})"),
            CheckOutcome::State {
                activity, expected, ..
            } => format!("state({activity}={})", expected.as_str()),
            CheckOutcome::Variable { name, activity, .. } => match activity {
                Some(activity) => format!("variable({activity}.{name})"),
                None => format!("variable({name})"),
            },
            CheckOutcome::TaskCount { expected, .. } => format!("task_count({expected})"),
        }
    }
}

/// Run all checks against the engine and collect outcomes.
///
/// A closed case instance has no live executions: `absent` checks pass and
/// every other observation is empty.
#[instrument(skip_all, fields(check_count = checks.len()))]
pub fn run_checks(engine: &CaseEngine, case: ExecutionId, checks: &[Check]) -> Judgment {
    let mut outcomes = Vec::with_capacity(checks.len());
    for check in checks {
        let outcome = match check {
            Check::Absent { activity } => {
                let observed = observe_state(engine, case, activity);
                CheckOutcome::Absent {
                    activity: activity.clone(),
                    passed: observed.is_none(),
                    observed,
                }
            }
            Check::State { activity, state } => {
                let observed = observe_state(engine, case, activity);
                CheckOutcome::State {
                    activity: activity.clone(),
                    passed: observed == Some(*state),
                    expected: *state,
                    observed,
                }
            }
            Check::Variable {
                name,
                value,
                activity,
            } => {
                let scope = match activity {
                    Some(activity) => engine
                        .find_by_activity_id(case, activity)
                        .map(|execution| execution.id()),
                    None => Some(case),
                };
                let observed = scope
                    .and_then(|scope| engine.get_variable(scope, name))
                    .cloned();
                CheckOutcome::Variable {
                    name: name.clone(),
                    activity: activity.clone(),
                    passed: observed.as_ref() == Some(value),
                    expected: value.clone(),
                    observed,
                }
            }
            Check::TaskCount { count } => {
                let observed = engine.tasks().for_case(case.case).len();
                CheckOutcome::TaskCount {
                    passed: observed == *count,
                    expected: *count,
                    observed,
                }
            }
        };
        debug!(check = %outcome.label(), passed = outcome.passed(), "check result");
        outcomes.push(outcome);
    }
    Judgment { checks: outcomes }
}

pub fn write_judgment(path: &Path, judgment: &Judgment) -> Result<()> {
    let contents = serde_json::to_string_pretty(judgment).context("serialize checks")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn observe_state(engine: &CaseEngine, case: ExecutionId, activity: &str) -> Option<State> {
    engine
        .find_by_activity_id(case, activity)
        .map(|execution| execution.state())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::start_case;
    use casekit::io::config::EngineConfig;
    use casekit::test_support::{CASE_PLAN_ID, case_plan, human_task, model, stage};
    use serde_json::json;

    fn started() -> (CaseEngine, ExecutionId) {
        let definition = model(
            "judge",
            case_plan(vec![human_task("A"), stage("S", vec![human_task("B")])]),
            Vec::new(),
        );
        start_case(EngineConfig::default(), definition).expect("start")
    }

    #[test]
    fn observes_states_and_tasks() {
        let (engine, case) = started();
        let checks = vec![
            Check::State {
                activity: "A".to_string(),
                state: State::Active,
            },
            Check::State {
                activity: CASE_PLAN_ID.to_string(),
                state: State::Completed,
            },
            Check::Absent {
                activity: "missing".to_string(),
            },
            Check::TaskCount { count: 2 },
        ];

        let judgment = run_checks(&engine, case, &checks);

        let passed: Vec<bool> = judgment.checks.iter().map(CheckOutcome::passed).collect();
        assert_eq!(passed, vec![true, false, true, true]);
        assert_eq!(
            judgment.checks[1],
            CheckOutcome::State {
                activity: CASE_PLAN_ID.to_string(),
                passed: false,
                expected: State::Completed,
                observed: Some(State::Active),
            }
        );
    }

    #[test]
    fn observes_variables_from_scope() {
        let (mut engine, case) = started();
        engine
            .set_variable(case, "amount", json!(5))
            .expect("set variable");
        let checks = vec![
            Check::Variable {
                name: "amount".to_string(),
                value: json!(5),
                activity: Some("B".to_string()),
            },
            Check::Variable {
                name: "other".to_string(),
                value: json!(1),
                activity: None,
            },
        ];

        let judgment = run_checks(&engine, case, &checks);

        assert!(judgment.checks[0].passed());
        assert!(!judgment.checks[1].passed());
        assert_eq!(judgment.checks[1].label(), "variable(other)");
    }

    #[test]
    fn writes_judgment_json() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("checks.json");
        let judgment = Judgment {
            checks: vec![CheckOutcome::TaskCount {
                passed: true,
                expected: 0,
                observed: 0,
            }],
        };
        write_judgment(&path, &judgment).expect("write");
        let contents = fs::read_to_string(&path).expect("read");
        assert!(contents.contains("\"type\": \"task_count\""));
    }
}
