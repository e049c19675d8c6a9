//! Scenario file parsing and validation.
//!
//! Scenarios are TOML files naming a case model, a script of engine commands
//! and the checks to judge once the script has run. See `scenario/cases/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use casekit::core::types::State;
use casekit::core::variables::Variables;
use serde::Deserialize;
use serde_json::Value;

/// A parsed scenario file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScenarioFile {
    pub scenario: ScenarioMeta,
    #[serde(default)]
    pub config: ConfigOverrides,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub checks: Vec<Check>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ScenarioMeta {
    /// Unique identifier (slug format: `[a-z0-9_-]+`).
    pub id: String,
    pub description: String,
    /// Case model file, relative to the scenario file.
    pub model: PathBuf,
}

/// Engine configuration overrides for the scenario.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub max_cascade_steps: Option<usize>,
    pub strict_undefined: Option<bool>,
    pub create_human_tasks: Option<bool>,
}

/// One engine command. Executions are addressed by activity id; steps that
/// may target the case plan default to it when `activity` is omitted.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Complete {
        activity: String,
        #[serde(default)]
        variables: Variables,
    },
    ManualStart {
        activity: String,
    },
    Suspend {
        activity: String,
    },
    Resume {
        activity: String,
    },
    Terminate {
        activity: Option<String>,
    },
    SetVariable {
        activity: Option<String>,
        name: String,
        value: Value,
        #[serde(default)]
        local: bool,
    },
    Close,
}

/// Verification check judged after the script has run.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Check {
    /// No live execution of the activity exists.
    Absent { activity: String },
    /// The live execution of the activity is in `state`.
    State { activity: String, state: State },
    /// The variable visible from the activity (default: case plan) equals `value`.
    Variable {
        name: String,
        value: Value,
        activity: Option<String>,
    },
    /// Number of task-list records of the case instance.
    TaskCount { count: usize },
}

impl ScenarioFile {
    /// Load and validate a scenario file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read scenario {}", path.display()))?;
        let scenario: ScenarioFile = toml::from_str(&contents)
            .with_context(|| format!("parse scenario {}", path.display()))?;
        scenario
            .validate()
            .with_context(|| format!("validate scenario {}", path.display()))?;
        Ok(scenario)
    }

    #[cfg(test)]
    pub fn parse_str(contents: &str) -> Result<Self> {
        let scenario: ScenarioFile = toml::from_str(contents).context("parse scenario")?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Model path resolved against the directory holding the scenario file.
    pub fn model_path(&self, scenario_path: &Path) -> PathBuf {
        match scenario_path.parent() {
            Some(dir) => dir.join(&self.scenario.model),
            None => self.scenario.model.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        validate_scenario_id(&self.scenario.id)?;
        if self.scenario.description.trim().is_empty() {
            bail!("scenario.description must be non-empty");
        }
        if self.scenario.model.as_os_str().is_empty() {
            bail!("scenario.model must be non-empty");
        }
        if let Some(max_cascade_steps) = self.config.max_cascade_steps
            && max_cascade_steps == 0
        {
            bail!("config.max_cascade_steps must be > 0");
        }
        if self.checks.is_empty() {
            bail!("checks must be a non-empty array");
        }
        for (index, step) in self.steps.iter().enumerate() {
            step.validate()
                .with_context(|| format!("steps[{}] invalid", index))?;
        }
        for (index, check) in self.checks.iter().enumerate() {
            check
                .validate()
                .with_context(|| format!("checks[{}] invalid", index))?;
        }
        Ok(())
    }
}

impl Step {
    pub fn label(&self) -> String {
        match self {
            Step::Complete { activity, .. } => format!("complete({activity})"),
            Step::ManualStart { activity } => format!("manual_start({activity})"),
            Step::Suspend { activity } => format!("suspend({activity})"),
            Step::Resume { activity } => format!("resume({activity})"),
            Step::Terminate { activity } => {
                format!("terminate({})", activity.as_deref().unwrap_or("case"))
            }
            Step::SetVariable { name, .. } => format!("set_variable({name})"),
            Step::Close => "close".to_string(),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Step::Complete { activity, .. }
            | Step::ManualStart { activity }
            | Step::Suspend { activity }
            | Step::Resume { activity } => require_activity(activity),
            Step::Terminate { activity } => activity.as_deref().map_or(Ok(()), require_activity),
            Step::SetVariable { activity, name, .. } => {
                if name.trim().is_empty() {
                    bail!("set_variable.name must be non-empty");
                }
                activity.as_deref().map_or(Ok(()), require_activity)
            }
            Step::Close => Ok(()),
        }
    }
}

impl Check {
    fn validate(&self) -> Result<()> {
        match self {
            Check::Absent { activity } | Check::State { activity, .. } => {
                require_activity(activity)
            }
            Check::Variable { name, activity, .. } => {
                if name.trim().is_empty() {
                    bail!("variable.name must be non-empty");
                }
                activity.as_deref().map_or(Ok(()), require_activity)
            }
            Check::TaskCount { .. } => Ok(()),
        }
    }
}

fn require_activity(activity: &str) -> Result<()> {
    if activity.trim().is_empty() {
        bail!("activity must be non-empty");
    }
    Ok(())
}

/// Discover and load all scenario files from a directory.
///
/// Returns scenarios sorted by id. Each file must be named after its id.
pub fn discover_scenarios(dir: &Path) -> Result<Vec<ScenarioFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut scenarios = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("read scenarios dir {}", dir.display()))?
    {
        let entry = entry.context("read scenario entry")?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        let scenario = ScenarioFile::load(&path)?;
        if path.file_stem().and_then(|stem| stem.to_str()) != Some(scenario.scenario.id.as_str()) {
            return Err(anyhow!(
                "{} must be named {}.toml",
                path.display(),
                scenario.scenario.id
            ));
        }
        scenarios.push(scenario);
    }
    scenarios.sort_by(|left, right| left.scenario.id.cmp(&right.scenario.id));
    Ok(scenarios)
}

fn validate_scenario_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("scenario.id must be non-empty");
    }
    if id.contains('/') || id.contains('\\') {
        bail!("scenario.id must not contain path separators");
    }
    if id.contains("..") {
        bail!("scenario.id must not contain '..'");
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("scenario.id must use [a-z0-9_-] only");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_valid_scenario() {
        let input = r#"
[scenario]
id = "exit-task"
description = "completing HT1 exits HT2"
model = "../models/exit_task.json"

[config]
max_cascade_steps = 500

[[steps]]
type = "complete"
activity = "PI_HumanTask_1"
variables = { value = 100 }

[[steps]]
type = "set_variable"
name = "flag"
value = true

[[steps]]
type = "close"

[[checks]]
type = "absent"
activity = "PI_HumanTask_2"

[[checks]]
type = "state"
activity = "CasePlanModel"
state = "completed"

[[checks]]
type = "variable"
name = "exit"
value = true

[[checks]]
type = "task_count"
count = 0
"#;
        let scenario = ScenarioFile::parse_str(input).expect("scenario parses");
        assert_eq!(scenario.scenario.id, "exit-task");
        assert_eq!(scenario.config.max_cascade_steps, Some(500));
        assert_eq!(scenario.steps.len(), 3);
        assert_eq!(scenario.checks.len(), 4);
        match &scenario.steps[0] {
            Step::Complete { variables, .. } => assert_eq!(variables.get("value"), Some(&json!(100))),
            other => panic!("expected complete, got {other:?}"),
        }
        assert_eq!(
            scenario.checks[1],
            Check::State {
                activity: "CasePlanModel".to_string(),
                state: State::Completed
            }
        );
    }

    #[test]
    fn resolves_model_relative_to_scenario() {
        let input = r#"
[scenario]
id = "rel"
description = "relative model"
model = "../models/m.json"

[[checks]]
type = "task_count"
count = 0
"#;
        let scenario = ScenarioFile::parse_str(input).expect("scenario parses");
        let path = scenario.model_path(Path::new("/repo/scenario/cases/rel.toml"));
        assert_eq!(path, PathBuf::from("/repo/scenario/cases/../models/m.json"));
    }

    #[test]
    fn rejects_invalid_id() {
        let input = r#"
[scenario]
id = "Bad/Id"
description = "x"
model = "m.json"

[[checks]]
type = "task_count"
count = 0
"#;
        let err = ScenarioFile::parse_str(input).expect_err("invalid id");
        assert!(err.to_string().contains("scenario.id"));
    }

    #[test]
    fn rejects_missing_checks() {
        let input = r#"
[scenario]
id = "no-checks"
description = "x"
model = "m.json"
"#;
        let err = ScenarioFile::parse_str(input).expect_err("no checks");
        assert!(err.to_string().contains("checks"));
    }

    #[test]
    fn rejects_blank_activity() {
        let input = r#"
[scenario]
id = "blank"
description = "x"
model = "m.json"

[[steps]]
type = "suspend"
activity = " "

[[checks]]
type = "task_count"
count = 0
"#;
        let err = ScenarioFile::parse_str(input).expect_err("blank activity");
        assert!(format!("{err:#}").contains("steps[0]"));
    }

    #[test]
    fn discovers_sorted_scenarios() {
        let temp = tempfile::tempdir().expect("tempdir");
        for id in ["b-second", "a-first"] {
            fs::write(
                temp.path().join(format!("{id}.toml")),
                format!(
                    "[scenario]\nid = \"{id}\"\ndescription = \"d\"\nmodel = \"m.json\"\n\n[[checks]]\ntype = \"task_count\"\ncount = 0\n"
                ),
            )
            .expect("write scenario");
        }
        fs::write(temp.path().join("notes.md"), "ignored").expect("write notes");

        let scenarios = discover_scenarios(temp.path()).expect("discover");
        let ids: Vec<&str> = scenarios.iter().map(|s| s.scenario.id.as_str()).collect();
        assert_eq!(ids, vec!["a-first", "b-second"]);
    }

    #[test]
    fn rejects_file_named_differently_from_id() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join("other.toml"),
            "[scenario]\nid = \"named\"\ndescription = \"d\"\nmodel = \"m.json\"\n\n[[checks]]\ntype = \"task_count\"\ncount = 0\n",
        )
        .expect("write scenario");

        let err = discover_scenarios(temp.path()).expect_err("misnamed file");
        assert!(err.to_string().contains("must be named named.toml"));
    }
}
