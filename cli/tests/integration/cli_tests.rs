//! CLI surface: help, validation failures and the `--json` error contract.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A plane whose provider and directory programs do not exist, so any call
/// that reaches them fails fast instead of touching a real cloud.
const PLANE_YAML: &str = "\
name: agents
project: acme-agents
zone: us-central1-a
provider_program: /nonexistent/gcloud
";

fn plane(home: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("plane"));
    cmd.env("NO_COLOR", "1")
        .env("AGENTS_PLANE_HOME", home.path())
        .env_remove("RUST_LOG");
    cmd
}

fn configured_home() -> TempDir {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join("plane.yaml"), PLANE_YAML).unwrap();
    home
}

// --- Help and version ---

#[test]
fn no_args_shows_help_and_exits_two() {
    let home = TempDir::new().unwrap();
    plane(&home)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn help_lists_every_command() {
    let home = TempDir::new().unwrap();
    let output = plane(&home).arg("--help").output().unwrap();
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    for command in ["create-plane", "add-agent", "remove-agent", "status", "watch"] {
        assert!(help.contains(command), "help is missing {command}:\n{help}");
    }
}

#[test]
fn version_flag_names_the_binary() {
    let home = TempDir::new().unwrap();
    plane(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("plane "));
}

#[test]
fn add_agent_requires_an_owner() {
    let home = TempDir::new().unwrap();
    plane(&home).arg("add-agent").assert().code(2);
}

// --- Validation failures exit 10 before any provider call ---

#[test]
fn add_agent_without_plane_is_a_validation_error() {
    let home = TempDir::new().unwrap();
    plane(&home)
        .args(["add-agent", "alice@example.com"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("create-plane"));
}

#[test]
fn malformed_owner_is_rejected() {
    let home = configured_home();
    plane(&home)
        .args(["add-agent", "not-an-email"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("not-an-email"));
}

#[test]
fn out_of_range_budget_is_rejected() {
    let home = configured_home();
    plane(&home)
        .args(["add-agent", "alice@example.com", "--budget", "0"])
        .assert()
        .code(10);
}

#[test]
fn remove_agent_rejects_malformed_owner() {
    let home = configured_home();
    plane(&home)
        .args(["remove-agent", "bob"])
        .assert()
        .code(10);
}

#[test]
fn invalid_plane_name_is_rejected() {
    let home = TempDir::new().unwrap();
    plane(&home)
        .args(["create-plane", "--name", "Bad_Name", "--yes"])
        .assert()
        .code(10);
    assert!(!home.path().join("setup-state.json").exists());
}

#[test]
fn no_color_env_takes_any_value() {
    let home = TempDir::new().unwrap();
    for value in ["1", "yes", "true"] {
        plane(&home)
            .env("NO_COLOR", value)
            .arg("status")
            .assert()
            .success();
    }
}

#[test]
fn no_color_flag_is_accepted_after_the_command() {
    let home = TempDir::new().unwrap();
    plane(&home)
        .args(["status", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("create-plane"));
}

// --- JSON mode ---

#[test]
fn json_error_is_a_single_object_on_stdout() {
    let home = configured_home();
    let output = plane(&home)
        .args(["--json", "add-agent", "not-an-email"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(10));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["error"], true);
    assert_eq!(value["code"], "validation");
    assert!(value["message"].as_str().unwrap().contains("not-an-email"));
}

#[test]
fn status_without_plane_reports_nothing_configured() {
    let home = TempDir::new().unwrap();
    plane(&home)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("create-plane"));
}

#[test]
fn status_json_includes_setup_progress() {
    let home = configured_home();
    std::fs::write(
        home.path().join("setup-state.json"),
        r#"{"last_completed_step": 6}"#,
    )
    .unwrap();

    let output = plane(&home).args(["--json", "status"]).output().unwrap();

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["plane"], "agents");
    assert_eq!(value["setup_completed"], 6);
    assert_eq!(value["setup_total"], 10);
    assert_eq!(value["agents"], serde_json::json!([]));
}

// --- Provider failures are classified ---

#[test]
fn unreachable_provider_is_an_infra_failure() {
    let home = configured_home();
    plane(&home)
        .args(["add-agent", "alice@example.com"])
        .assert()
        .code(20)
        .stderr(predicate::str::contains("/nonexistent/gcloud"));
    assert!(!home.path().join("agents").exists());
}
