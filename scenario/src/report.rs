use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::judge::Judgment;
use crate::outcome::Outcome;
use crate::results::RunMeta;

#[derive(Debug, Default)]
pub struct ReportSummary {
    pub runs: usize,
    pub success: usize,
    pub fail: usize,
    pub error: usize,
    pub avg_duration_secs: Option<f64>,
    pub check_pass_rates: BTreeMap<String, (usize, usize)>,
}

pub fn load_run_dirs(scenario_results_dir: &Path) -> Result<Vec<PathBuf>> {
    if !scenario_results_dir.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(scenario_results_dir)
        .with_context(|| format!("read {}", scenario_results_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub fn aggregate(scenario_results_dir: &Path) -> Result<(ReportSummary, Vec<String>)> {
    let mut summary = ReportSummary::default();
    let mut warnings = Vec::new();

    for run_dir in load_run_dirs(scenario_results_dir)? {
        let meta: RunMeta = match read_json(&run_dir.join("meta.json")) {
            Ok(meta) => meta,
            Err(err) => {
                warnings.push(format!(
                    "skip {}: meta.json invalid ({err:#})",
                    run_dir.display()
                ));
                continue;
            }
        };

        let judgment: Judgment = match read_json(&run_dir.join("checks.json")) {
            Ok(judgment) => judgment,
            Err(err) => {
                warnings.push(format!(
                    "skip {}: checks.json invalid ({err:#})",
                    run_dir.display()
                ));
                continue;
            }
        };

        summary.runs += 1;
        match meta.outcome {
            Some(Outcome::Success) => summary.success += 1,
            Some(Outcome::Fail) => summary.fail += 1,
            Some(Outcome::Error) | None => summary.error += 1,
        }

        summary.avg_duration_secs = Some(match summary.avg_duration_secs {
            None => meta.duration_secs,
            Some(avg) => {
                let total = avg * (summary.runs as f64 - 1.0) + meta.duration_secs;
                total / summary.runs as f64
            }
        });

        for check in &judgment.checks {
            let entry = summary
                .check_pass_rates
                .entry(check.label())
                .or_insert((0, 0));
            if check.passed() {
                entry.0 += 1;
            }
            entry.1 += 1;
        }
    }

    Ok((summary, warnings))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}
