//! Case model loading with schema + invariant validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;

use crate::core::invariants::validate_model;
use crate::model::CaseModel;

/// JSON Schema every case model file must satisfy.
pub const CASE_MODEL_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/case_model/v1.schema.json"
));

/// Load and validate a case model from disk (schema + invariants).
pub fn load_model(path: &Path) -> Result<CaseModel> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read model {}", path.display()))?;
    parse_model(&contents).with_context(|| format!("load model {}", path.display()))
}

/// Parse and validate a case model from JSON text.
pub fn parse_model(contents: &str) -> Result<CaseModel> {
    let value: Value = serde_json::from_str(contents).context("parse model json")?;
    validate_schema(&value)?;
    let model: CaseModel = serde_json::from_value(value).context("deserialize model")?;
    validate_model_invariants(&model)?;
    Ok(model)
}

/// Write a model as pretty JSON.
pub fn write_model(path: &Path, model: &CaseModel) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(model)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write model {}", path.display()))
}

fn validate_schema(model: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(CASE_MODEL_SCHEMA).context("parse model schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(model) {
        let messages = compiled
            .iter_errors(model)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "model schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn validate_model_invariants(model: &CaseModel) -> Result<()> {
    let errors = validate_model(model);
    if errors.is_empty() {
        return Ok(());
    }
    Err(anyhow!("model invariants failed: {}", errors.join("; ")))
}
