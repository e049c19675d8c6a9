//! Case engine CLI.
//!
//! Validates case model files, shows the execution tree a model produces on
//! start, and writes a default engine config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

use casekit::CaseEngine;
use casekit::engine::{ExecutionSnapshot, HumanTask};
use casekit::exit_codes;
use casekit::io::config::{EngineConfig, load_config, write_config};
use casekit::io::model_store::load_model;

#[derive(Parser)]
#[command(name = "casekit", version, about = "Case-management execution engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a case model against the schema and model invariants.
    Validate {
        model: PathBuf,
    },
    /// Start an instance of a model and print its execution tree as JSON.
    Inspect {
        model: PathBuf,
        /// Engine config (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write a default engine config.
    InitConfig {
        #[arg(default_value = "casekit.toml")]
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Serialize)]
struct Inspection {
    definition: String,
    tree: ExecutionSnapshot,
    tasks: Vec<HumanTask>,
}

fn main() {
    casekit::logging::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::INVALID);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Validate { model } => cmd_validate(&model),
        Command::Inspect { model, config } => cmd_inspect(&model, config.as_deref()),
        Command::InitConfig { path, force } => cmd_init_config(&path, force),
    }
}

fn cmd_validate(path: &Path) -> Result<()> {
    let model = load_model(path)?;
    println!(
        "valid: {} ({} sentries)",
        model.id,
        model.sentries.len()
    );
    Ok(())
}

fn cmd_inspect(path: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = match config_path {
        Some(config_path) => load_config(config_path)?,
        None => EngineConfig::default(),
    };
    let model = load_model(path)?;
    let definition = model.id.clone();
    debug!(definition, "inspecting model");

    let mut engine = CaseEngine::new(config);
    engine.deploy(model).context("deploy model")?;
    let case = engine.start(&definition).context("start case instance")?;
    let instance = engine
        .instance(case)
        .with_context(|| format!("case instance {case} missing after start"))?;

    let inspection = Inspection {
        definition,
        tree: instance.snapshot(),
        tasks: engine
            .tasks()
            .for_case(case.case)
            .into_iter()
            .cloned()
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&inspection).context("serialize inspection")?
    );
    Ok(())
}

fn cmd_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &EngineConfig::default())?;
    println!("wrote {}", path.display());
    Ok(())
}
