//! CLI command implementations.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::outcome::Outcome;
use crate::report::aggregate;
use crate::run::run_scenario;
use crate::scenario::{ScenarioFile, discover_scenarios};

fn cases_dir(repo_root: &Path) -> PathBuf {
    repo_root.join("scenario").join("cases")
}

fn results_base(repo_root: &Path) -> PathBuf {
    repo_root.join("scenario").join("results")
}

/// List all available scenarios.
pub fn list_scenarios(repo_root: &Path) -> Result<()> {
    for scenario in discover_scenarios(&cases_dir(repo_root))? {
        println!("{}\t{}", scenario.scenario.id, scenario.scenario.description);
    }
    Ok(())
}

/// Run a scenario by id (optionally multiple times). Returns the worst outcome.
pub fn run_scenario_by_id(repo_root: &Path, scenario_id: &str, runs: u32) -> Result<Outcome> {
    let scenario_path = cases_dir(repo_root).join(format!("{scenario_id}.toml"));
    if !scenario_path.exists() {
        bail!(
            "scenario {} not found at {}",
            scenario_id,
            scenario_path.display()
        );
    }
    let scenario = ScenarioFile::load(&scenario_path).context("load scenario")?;
    debug!(scenario_id, runs, "scenario loaded");

    info!(scenario_id, runs, "starting runs");
    let mut worst = Outcome::Success;
    for run_num in 1..=runs {
        let outcome = run_scenario(&results_base(repo_root), &scenario_path, &scenario, run_num)
            .context("run scenario")?;
        println!(
            "run: scenario={} run_id={} outcome={:?} results={}",
            scenario_id,
            outcome.run_id,
            outcome.outcome,
            outcome.results_dir.display()
        );
        worst = worst.max(outcome.outcome);
    }
    Ok(worst)
}

/// Run every scenario once. Returns the worst outcome.
pub fn run_all(repo_root: &Path) -> Result<Outcome> {
    let scenarios = discover_scenarios(&cases_dir(repo_root))?;
    if scenarios.is_empty() {
        bail!("no scenarios under {}", cases_dir(repo_root).display());
    }
    let mut worst = Outcome::Success;
    for scenario in &scenarios {
        let outcome = run_scenario_by_id(repo_root, &scenario.scenario.id, 1)?;
        worst = worst.max(outcome);
    }
    println!("run-all: scenarios={} worst={:?}", scenarios.len(), worst);
    Ok(worst)
}

/// Show aggregated results for a scenario.
pub fn report_scenario(repo_root: &Path, scenario_id: &str) -> Result<()> {
    let results_dir = results_base(repo_root).join(scenario_id);
    let (summary, warnings) = aggregate(&results_dir)?;
    println!("report: scenario={} runs={}", scenario_id, summary.runs);
    println!(
        "report: success={} fail={} error={}",
        summary.success, summary.fail, summary.error
    );
    if let Some(avg) = summary.avg_duration_secs {
        println!("report: avg_duration_secs={:.3}", avg);
    }
    for (label, (passed, total)) in summary.check_pass_rates {
        println!("report: check {} {}/{}", label, passed, total);
    }
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

/// Remove results for a scenario.
pub fn clean_scenario(repo_root: &Path, scenario_id: &str) -> Result<()> {
    let scenario_results = results_base(repo_root).join(scenario_id);
    if scenario_results.exists() {
        fs::remove_dir_all(&scenario_results)
            .with_context(|| format!("remove {}", scenario_results.display()))?;
    }
    println!(
        "clean: scenario={} results={}",
        scenario_id,
        scenario_results.display()
    );
    Ok(())
}
