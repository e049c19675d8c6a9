//! Engine driver: deploys the scenario model, starts an instance and replays
//! the step script against it.

use anyhow::{Context, Result, anyhow};
use casekit::CaseEngine;
use casekit::core::types::ExecutionId;
use casekit::io::config::EngineConfig;
use casekit::model::CaseModel;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::scenario::Step;

/// Outcome of replaying a step script.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptReport {
    pub steps_executed: usize,
    pub failure: Option<StepFailure>,
}

/// First step the engine rejected; later steps are not executed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepFailure {
    pub index: usize,
    pub step: String,
    pub message: String,
}

/// Deploy `model` on a fresh engine and start one case instance.
pub fn start_case(config: EngineConfig, model: CaseModel) -> Result<(CaseEngine, ExecutionId)> {
    let definition = model.id.clone();
    let mut engine = CaseEngine::new(config);
    engine.deploy(model).context("deploy model")?;
    let case = engine
        .start(&definition)
        .with_context(|| format!("start case {definition}"))?;
    Ok((engine, case))
}

/// Execute `steps` in order, stopping at the first rejected command.
#[instrument(skip_all, fields(step_count = steps.len()))]
pub fn run_steps(engine: &mut CaseEngine, case: ExecutionId, steps: &[Step]) -> ScriptReport {
    let mut report = ScriptReport::default();
    for (index, step) in steps.iter().enumerate() {
        let label = step.label();
        if let Err(err) = run_step(engine, case, step) {
            warn!(index, step = %label, error = %format!("{err:#}"), "step rejected");
            report.failure = Some(StepFailure {
                index,
                step: label,
                message: format!("{err:#}"),
            });
            break;
        }
        debug!(index, step = %label, "step executed");
        report.steps_executed += 1;
    }
    report
}

fn run_step(engine: &mut CaseEngine, case: ExecutionId, step: &Step) -> Result<()> {
    match step {
        Step::Complete {
            activity,
            variables,
        } => {
            let id = resolve(engine, case, activity)?;
            if variables.is_empty() {
                engine.complete(id)?;
            } else {
                engine.complete_with(id, variables.clone())?;
            }
        }
        Step::ManualStart { activity } => {
            let id = resolve(engine, case, activity)?;
            engine.manual_start(id)?;
        }
        Step::Suspend { activity } => {
            let id = resolve(engine, case, activity)?;
            engine.suspend(id)?;
        }
        Step::Resume { activity } => {
            let id = resolve(engine, case, activity)?;
            engine.resume(id)?;
        }
        Step::Terminate { activity } => {
            let id = resolve_or_case(engine, case, activity.as_deref())?;
            engine.terminate(id)?;
        }
        Step::SetVariable {
            activity,
            name,
            value,
            local,
        } => {
            let id = resolve_or_case(engine, case, activity.as_deref())?;
            if *local {
                engine.set_variable_local(id, name, value.clone())?;
            } else {
                engine.set_variable(id, name, value.clone())?;
            }
        }
        Step::Close => engine.close(case)?,
    }
    Ok(())
}

fn resolve(engine: &CaseEngine, case: ExecutionId, activity: &str) -> Result<ExecutionId> {
    engine
        .find_by_activity_id(case, activity)
        .map(|execution| execution.id())
        .ok_or_else(|| anyhow!("no live execution of {activity}"))
}

fn resolve_or_case(
    engine: &CaseEngine,
    case: ExecutionId,
    activity: Option<&str>,
) -> Result<ExecutionId> {
    match activity {
        Some(activity) => resolve(engine, case, activity),
        None => Ok(case),
    }
}
