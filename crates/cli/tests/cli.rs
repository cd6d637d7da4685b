#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn ci_engine() -> Command {
    let mut cmd = Command::cargo_bin("ci-engine").unwrap();
    for var in [
        "CI_ENGINE_EVENT",
        "CI_ENGINE_WORKSPACE",
        "CI_ENGINE_MAX_PARALLEL",
        "CI_ENGINE_TIMEOUT_SECS",
        "CI_ENGINE_RETRIES",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn write_workflow(dir: &TempDir, json: &str) -> std::path::PathBuf {
    let path = dir.path().join("main.workflow.json");
    std::fs::write(&path, json).unwrap();
    path
}

const PASSING: &str = r#"{
  "workflows": [{ "name": "CI", "on": "push", "resolves": ["build"] }],
  "actions": [
    { "name": "build", "uses": "sh", "args": "echo ok > built.txt", "resolves": ["test"] },
    { "name": "test", "uses": "sh", "args": "test -f built.txt" }
  ]
}"#;

const FAILING: &str = r#"{
  "workflows": [{ "name": "CI", "on": "push", "resolves": ["lint"] }],
  "actions": [
    { "name": "lint", "uses": "sh", "args": "exit 1", "resolves": ["test"] },
    { "name": "test", "uses": "sh", "args": "true" }
  ]
}"#;

// ---------------------------------------------------------------------------
// ci-engine validate
// ---------------------------------------------------------------------------

#[test]
fn validate_prints_action_order() {
    let dir = TempDir::new().unwrap();
    let path = write_workflow(&dir, PASSING);

    ci_engine()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"["build", "test"]"#));
}

#[test]
fn validate_rejects_dangling_reference_with_exit_code_2() {
    let dir = TempDir::new().unwrap();
    let path = write_workflow(
        &dir,
        r#"{ "workflows": [{ "name": "CI", "on": "push", "resolves": ["ghost"] }], "actions": [] }"#,
    );

    ci_engine()
        .arg("validate")
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("reference error"));
}

#[test]
fn validate_rejects_cycles() {
    let dir = TempDir::new().unwrap();
    let path = write_workflow(
        &dir,
        r#"{
          "workflows": [{ "name": "CI", "on": "push", "resolves": ["a"] }],
          "actions": [
            { "name": "a", "uses": "sh", "resolves": ["b"] },
            { "name": "b", "uses": "sh", "resolves": ["a"] }
          ]
        }"#,
    );

    ci_engine()
        .arg("validate")
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cycle error"));
}

// ---------------------------------------------------------------------------
// ci-engine plan
// ---------------------------------------------------------------------------

#[test]
fn plan_lists_matching_workflows() {
    let dir = TempDir::new().unwrap();
    let path = write_workflow(&dir, PASSING);

    ci_engine()
        .args(["plan", "--event", "push"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("workflow 'CI' (on push)"))
        .stdout(predicate::str::contains("after build"));

    ci_engine()
        .args(["plan", "--event", "release"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("No workflow is triggered"));
}

// ---------------------------------------------------------------------------
// ci-engine run
// ---------------------------------------------------------------------------

#[test]
fn run_succeeds_when_every_action_succeeds() {
    let dir = TempDir::new().unwrap();
    let path = write_workflow(&dir, PASSING);

    ci_engine()
        .arg("run")
        .arg(&path)
        .arg("--workspace")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("workflow 'CI' succeeded"));

    assert!(dir.path().join("built.txt").exists());
}

#[test]
fn run_exits_non_zero_and_reports_skipped_actions() {
    let dir = TempDir::new().unwrap();
    let path = write_workflow(&dir, FAILING);

    ci_engine()
        .arg("run")
        .arg(&path)
        .arg("--workspace")
        .arg(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("workflow 'CI' failed"))
        .stdout(predicate::str::contains("upstream action 'lint' failed"));
}

#[test]
fn run_json_output_contains_action_statuses() {
    let dir = TempDir::new().unwrap();
    let path = write_workflow(&dir, FAILING);

    let output = ci_engine()
        .arg("run")
        .arg(&path)
        .arg("--json")
        .arg("--workspace")
        .arg(dir.path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(reports[0]["status"], "failed");
    assert_eq!(reports[0]["actions"][0]["status"], "failed");
    assert_eq!(reports[0]["actions"][1]["status"], "skipped");
}

#[test]
fn run_with_unmatched_event_does_nothing() {
    let dir = TempDir::new().unwrap();
    let path = write_workflow(&dir, PASSING);

    ci_engine()
        .arg("run")
        .arg(&path)
        .args(["--event", "pull_request", "--workspace"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No workflow is triggered"));

    assert!(!dir.path().join("built.txt").exists());
}

#[test]
fn run_with_unknown_action_source_exits_2_before_running() {
    let dir = TempDir::new().unwrap();
    let path = write_workflow(
        &dir,
        r#"{
          "workflows": [{ "name": "CI", "on": "push", "resolves": ["a"] }],
          "actions": [
            { "name": "a", "uses": "sh", "args": "touch ran.txt", "resolves": ["b"] },
            { "name": "b", "uses": "./local/action" }
          ]
        }"#,
    );

    ci_engine()
        .arg("run")
        .arg(&path)
        .arg("--workspace")
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unsupported action source"));

    assert!(!dir.path().join("ran.txt").exists());
}

#[test]
fn run_with_missing_workspace_is_not_a_load_error() {
    let dir = TempDir::new().unwrap();
    let path = write_workflow(&dir, PASSING);

    ci_engine()
        .arg("run")
        .arg(&path)
        .arg("--workspace")
        .arg(dir.path().join("no-such-checkout"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("is not accessible"));
}
