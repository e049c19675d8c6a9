mod cli;
mod config;
mod harness;
mod judge;
mod outcome;
mod report;
mod results;
mod run;
mod scenario;

use anyhow::Result;
use clap::{Parser, Subcommand};
use casekit::exit_codes;

use crate::outcome::Outcome;

#[derive(Parser)]
#[command(name = "scenario", version, about = "Scenario harness for the case engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    List,
    Run {
        scenario_id: String,
        #[arg(long, default_value_t = 1)]
        runs: u32,
    },
    /// Run every scenario once.
    RunAll,
    Report {
        scenario_id: String,
    },
    Clean {
        scenario_id: String,
    },
}

fn main() {
    casekit::logging::init();
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn dispatch(cli: Cli) -> Result<i32> {
    let repo_root = std::env::current_dir()?;
    let outcome = match cli.command {
        Command::List => {
            cli::list_scenarios(&repo_root)?;
            Outcome::Success
        }
        Command::Run { scenario_id, runs } => {
            cli::run_scenario_by_id(&repo_root, &scenario_id, runs)?
        }
        Command::RunAll => cli::run_all(&repo_root)?,
        Command::Report { scenario_id } => {
            cli::report_scenario(&repo_root, &scenario_id)?;
            Outcome::Success
        }
        Command::Clean { scenario_id } => {
            cli::clean_scenario(&repo_root, &scenario_id)?;
            Outcome::Success
        }
    };
    Ok(match outcome {
        Outcome::Success => exit_codes::OK,
        Outcome::Fail => exit_codes::FAILED,
        Outcome::Error => exit_codes::ERROR,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_runs() {
        let cli = Cli::parse_from(["scenario", "run", "exit-task", "--runs", "3"]);
        assert!(matches!(
            cli.command,
            Command::Run { scenario_id, runs: 3 } if scenario_id == "exit-task"
        ));
    }

    #[test]
    fn parse_run_all() {
        let cli = Cli::parse_from(["scenario", "run-all"]);
        assert!(matches!(cli.command, Command::RunAll));
    }
}
