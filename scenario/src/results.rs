//! Result capture and persistence.
//!
//! Writes run metadata and the final execution tree to the results directory
//! for later analysis.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use casekit::engine::ExecutionSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::harness::ScriptReport;
use crate::outcome::Outcome;

/// Input for capturing results from a completed run.
#[derive(Debug)]
pub struct CaptureInput<'a> {
    pub scenario_id: &'a str,
    pub scenario_path: &'a Path,
    pub model_path: &'a Path,
    pub definition_id: &'a str,
    pub run_id: &'a str,
    pub script: &'a ScriptReport,
    /// Final execution tree; `None` once the case instance is closed.
    pub tree: Option<&'a ExecutionSnapshot>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Metadata for a scenario run, persisted to `meta.json`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RunMeta {
    pub scenario_id: String,
    pub run_id: String,
    /// SHA-256 hash of the scenario file for reproducibility tracking.
    pub scenario_hash: String,
    /// SHA-256 hash of the case model file.
    pub model_hash: String,
    pub definition_id: String,
    pub outcome: Option<Outcome>,
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
    pub steps_executed: usize,
    /// Message of the rejected step, if any.
    pub error: Option<String>,
    /// Non-fatal errors encountered during capture.
    pub errors: Vec<String>,
}

/// Capture results from a completed run to the results directory.
#[instrument(skip_all, fields(scenario_id = %input.scenario_id, run_id = %input.run_id))]
pub fn capture_results(base_dir: &Path, input: &CaptureInput<'_>) -> Result<PathBuf> {
    let results_dir = results_dir(base_dir, input.scenario_id, input.run_id);
    fs::create_dir_all(&results_dir)
        .with_context(|| format!("create results dir {}", results_dir.display()))?;

    let mut errors = Vec::new();
    let scenario_hash = hash_or_record(input.scenario_path, "scenario hash", &mut errors);
    let model_hash = hash_or_record(input.model_path, "model hash", &mut errors);

    if let Some(tree) = input.tree {
        let tree_path = results_dir.join("tree.json");
        if let Err(err) = write_json(&tree_path, tree) {
            errors.push(format!("tree.json: {err:#}"));
        }
    }

    if !errors.is_empty() {
        warn!(errors = ?errors, "artifact capture had errors");
    }

    let duration = input.finished_at - input.started_at;
    let meta = RunMeta {
        scenario_id: input.scenario_id.to_string(),
        run_id: input.run_id.to_string(),
        scenario_hash,
        model_hash,
        definition_id: input.definition_id.to_string(),
        outcome: None,
        start_time: input.started_at.to_rfc3339(),
        end_time: input.finished_at.to_rfc3339(),
        duration_secs: duration.num_milliseconds() as f64 / 1000.0,
        steps_executed: input.script.steps_executed,
        error: input
            .script
            .failure
            .as_ref()
            .map(|failure| format!("{}: {}", failure.step, failure.message)),
        errors,
    };

    write_json(&results_dir.join("meta.json"), &meta)?;
    debug!(results_dir = %results_dir.display(), "results captured");
    Ok(results_dir)
}

pub fn update_outcome(results_dir: &Path, outcome: Outcome) -> Result<()> {
    let meta_path = results_dir.join("meta.json");
    let mut meta: RunMeta = serde_json::from_str(
        &fs::read_to_string(&meta_path).with_context(|| format!("read {}", meta_path.display()))?,
    )
    .context("parse meta")?;
    meta.outcome = Some(outcome);
    write_json(&meta_path, &meta)?;
    Ok(())
}

pub fn results_dir(base_dir: &Path, scenario_id: &str, run_id: &str) -> PathBuf {
    base_dir.join(scenario_id).join(run_id)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value).context("serialize json")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn hash_or_record(path: &Path, label: &str, errors: &mut Vec<String>) -> String {
    match file_sha256(path) {
        Ok(hash) => hash,
        Err(err) => {
            errors.push(format!("{label}: {err:#}"));
            String::new()
        }
    }
}

fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let digest = hasher.finalize();
    Ok(hex::encode(digest))
}
