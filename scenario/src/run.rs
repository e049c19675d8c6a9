//! Scenario execution orchestration.
//!
//! Coordinates model loading, the engine script, checks and result capture.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use casekit::io::config::EngineConfig;
use casekit::io::model_store::load_model;
use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::config::apply_overrides;
use crate::harness::{ScriptReport, StepFailure, run_steps, start_case};
use crate::judge::{Judgment, run_checks, write_judgment};
use crate::outcome::{Outcome, classify_outcome};
use crate::results::{CaptureInput, capture_results, update_outcome};
use crate::scenario::ScenarioFile;

/// Result of running a single scenario.
#[derive(Debug)]
pub struct RunOutcome {
    /// Unique identifier for this run.
    pub run_id: String,
    /// Path to the results directory.
    pub results_dir: PathBuf,
    /// Classified outcome.
    pub outcome: Outcome,
}

/// Run a scenario end-to-end: engine start, step script, checks, result capture.
///
/// Results land under `results_base/<scenario id>/<run id>`.
#[instrument(skip_all, fields(scenario_id = %scenario.scenario.id, run_num = run_num))]
pub fn run_scenario(
    results_base: &Path,
    scenario_path: &Path,
    scenario: &ScenarioFile,
    run_num: u32,
) -> Result<RunOutcome> {
    info!("scenario run started");

    let model_path = scenario.model_path(scenario_path);
    let model = load_model(&model_path).context("load case model")?;
    let definition_id = model.id.clone();
    let config = apply_overrides(EngineConfig::default(), &scenario.config)
        .context("apply config overrides")?;

    let started_at = Utc::now();
    let run_id = format!("run-{}-{run_num}", started_at.format("%Y%m%d_%H%M%S"));

    debug!(definition_id = %definition_id, "starting case instance");
    let (script, judgment, tree) = match start_case(config, model) {
        Ok((mut engine, case)) => {
            let script = run_steps(&mut engine, case, &scenario.steps);
            let judgment = run_checks(&engine, case, &scenario.checks);
            let tree = engine.instance(case).map(|instance| instance.snapshot());
            (script, judgment, tree)
        }
        Err(err) => {
            let script = ScriptReport {
                steps_executed: 0,
                failure: Some(StepFailure {
                    index: 0,
                    step: "start".to_string(),
                    message: format!("{err:#}"),
                }),
            };
            (script, Judgment::default(), None)
        }
    };
    let finished_at = Utc::now();
    info!(
        steps_executed = script.steps_executed,
        duration_secs = (finished_at - started_at).num_milliseconds() as f64 / 1000.0,
        "script finished"
    );

    let capture_input = CaptureInput {
        scenario_id: &scenario.scenario.id,
        scenario_path,
        model_path: &model_path,
        definition_id: &definition_id,
        run_id: &run_id,
        script: &script,
        tree: tree.as_ref(),
        started_at,
        finished_at,
    };
    let results_dir =
        capture_results(results_base, &capture_input).context("capture results")?;
    write_judgment(&results_dir.join("checks.json"), &judgment).context("write checks")?;

    let outcome = classify_outcome(&script, &judgment);
    update_outcome(&results_dir, outcome).context("update outcome")?;

    info!(outcome = ?outcome, results_dir = %results_dir.display(), "scenario run complete");

    Ok(RunOutcome {
        run_id,
        results_dir,
        outcome,
    })
}
