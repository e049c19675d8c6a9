//! Engine configuration stored as TOML.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Engine configuration (TOML).
///
/// Missing fields take their defaults, so an empty file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on work items a single command may process before it is
    /// rolled back with a cascade-limit error.
    pub max_cascade_steps: usize,

    pub guard: GuardConfig,

    pub tasks: TaskConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GuardConfig {
    /// Treat undefined variables in an if-part as an evaluation error.
    pub strict_undefined: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            strict_undefined: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskConfig {
    /// Pair every active human task with a task-list record.
    pub create_human_tasks: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            create_human_tasks: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cascade_steps: 10_000,
            guard: GuardConfig::default(),
            tasks: TaskConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_cascade_steps == 0 {
            return Err(anyhow!("max_cascade_steps must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Parse and validate config TOML.
pub fn parse_config(contents: &str) -> Result<EngineConfig> {
    let cfg: EngineConfig = toml::from_str(contents).context("parse config toml")?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
