//! CLI tests for the `casekit` binary.
//!
//! Spawns the binary and verifies exit codes and output for valid and
//! invalid models and for config initialization.

use std::fs;
use std::path::Path;
use std::process::Command;

use casekit::core::types::{CriterionKind, StandardEvent};
use casekit::exit_codes;
use casekit::io::config::{EngineConfig, load_config};
use casekit::io::model_store::write_model;
use casekit::test_support::{case_plan, human_task, model, on_part, sentry, stage};
use serde_json::Value;

fn write_sample_model(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("model.json");
    let definition = model(
        "sample",
        case_plan(vec![
            human_task("A"),
            stage("S", vec![human_task("B")]),
        ]),
        vec![sentry(
            "enterS",
            CriterionKind::Entry,
            "S",
            vec![on_part("A", StandardEvent::Complete)],
        )],
    );
    write_model(&path, &definition).expect("write model");
    path
}

#[test]
fn validate_accepts_valid_model() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_sample_model(temp.path());

    let output = Command::new(env!("CARGO_BIN_EXE_casekit"))
        .arg("validate")
        .arg(&path)
        .output()
        .expect("casekit validate");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("valid: sample"));
}

#[test]
fn validate_rejects_invalid_model() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("model.json");
    fs::write(
        &path,
        r#"{ "id": "bad", "plan": { "id": "root", "kind": "case_plan", "children": [
            { "id": "A", "kind": "task" }, { "id": "A", "kind": "task" } ] } }"#,
    )
    .expect("write model");

    let output = Command::new(env!("CARGO_BIN_EXE_casekit"))
        .arg("validate")
        .arg(&path)
        .output()
        .expect("casekit validate");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("duplicate plan item id 'A'"));
}

#[test]
fn inspect_prints_started_tree() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_sample_model(temp.path());

    let output = Command::new(env!("CARGO_BIN_EXE_casekit"))
        .arg("inspect")
        .arg(&path)
        .output()
        .expect("casekit inspect");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let inspection: Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(inspection["definition"], "sample");
    assert_eq!(inspection["tree"]["state"], "active");
    let children = inspection["tree"]["children"].as_array().expect("children");
    assert_eq!(children.len(), 2);
    assert_eq!(children[0]["activity_id"], "A");
    assert_eq!(children[1]["state"], "available");
    assert_eq!(inspection["tasks"].as_array().map(Vec::len), Some(1));
}

#[test]
fn init_config_writes_defaults_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("casekit.toml");

    let status = Command::new(env!("CARGO_BIN_EXE_casekit"))
        .arg("init-config")
        .arg(&path)
        .status()
        .expect("casekit init-config");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&path).expect("load"), EngineConfig::default());

    let status = Command::new(env!("CARGO_BIN_EXE_casekit"))
        .arg("init-config")
        .arg(&path)
        .status()
        .expect("casekit init-config");
    assert_eq!(status.code(), Some(exit_codes::INVALID));

    let status = Command::new(env!("CARGO_BIN_EXE_casekit"))
        .args(["init-config", "--force"])
        .arg(&path)
        .status()
        .expect("casekit init-config --force");
    assert_eq!(status.code(), Some(exit_codes::OK));
}
