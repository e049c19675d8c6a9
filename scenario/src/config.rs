//! Engine configuration merging.
//!
//! Applies scenario-specific overrides to the default engine configuration.

use anyhow::Result;
use casekit::io::config::EngineConfig;

use crate::scenario::ConfigOverrides;

/// Apply scenario overrides to the base engine config.
pub fn apply_overrides(mut base: EngineConfig, overrides: &ConfigOverrides) -> Result<EngineConfig> {
    if let Some(max_cascade_steps) = overrides.max_cascade_steps {
        base.max_cascade_steps = max_cascade_steps;
    }
    if let Some(strict_undefined) = overrides.strict_undefined {
        base.guard.strict_undefined = strict_undefined;
    }
    if let Some(create_human_tasks) = overrides.create_human_tasks {
        base.tasks.create_human_tasks = create_human_tasks;
    }
    base.validate()?;
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_defaults_without_overrides() {
        let base = EngineConfig::default();
        let merged = apply_overrides(base.clone(), &ConfigOverrides::default()).expect("merge");
        assert_eq!(merged, base);
    }

    #[test]
    fn applies_overrides() {
        let overrides = ConfigOverrides {
            max_cascade_steps: Some(20),
            strict_undefined: Some(false),
            create_human_tasks: None,
        };
        let merged = apply_overrides(EngineConfig::default(), &overrides).expect("merge");
        assert_eq!(merged.max_cascade_steps, 20);
        assert!(!merged.guard.strict_undefined);
        assert!(merged.tasks.create_human_tasks);
    }

    #[test]
    fn rejects_invalid_result() {
        let overrides = ConfigOverrides {
            max_cascade_steps: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(apply_overrides(EngineConfig::default(), &overrides).is_err());
    }
}
