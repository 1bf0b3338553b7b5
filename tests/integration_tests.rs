//! Integration tests for the intake CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to get an intake command isolated from the user's global config
fn intake(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("intake").unwrap();
    cmd.current_dir(tmp.path())
        .env("XDG_CONFIG_HOME", tmp.path().join("xdg"))
        .env_remove("INTAKE_WORKSPACE")
        .env_remove("INTAKE_DRAFT_TTL_HOURS")
        .env_remove("RUST_LOG");
    cmd
}

/// Helper to create a test workspace in a temp directory
fn setup_workspace() -> TempDir {
    let tmp = TempDir::new().unwrap();
    intake(&tmp).arg("init").assert().success();
    tmp
}

// ============================================================================
// Help & completions
// ============================================================================

#[test]
fn test_help_lists_commands() {
    let tmp = TempDir::new().unwrap();
    intake(&tmp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fill"))
        .stdout(predicate::str::contains("review"))
        .stdout(predicate::str::contains("cache"));
}

#[test]
fn test_completions_bash() {
    let tmp = TempDir::new().unwrap();
    intake(&tmp)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("intake"));
}

// ============================================================================
// Init
// ============================================================================

#[test]
fn test_init_creates_workspace() {
    let tmp = TempDir::new().unwrap();
    intake(&tmp)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized intake workspace"));

    assert!(tmp.path().join(".intake").is_dir());
    let config = fs::read_to_string(tmp.path().join(".intake/config.yaml")).unwrap();
    assert!(config.contains("draft_ttl_hours"));
    let gitignore = fs::read_to_string(tmp.path().join(".intake/.gitignore")).unwrap();
    assert!(gitignore.contains("*.db"));
}

#[test]
fn test_init_twice_reports_existing_workspace() {
    let tmp = setup_workspace();
    intake(&tmp)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_commands_outside_workspace_fail() {
    let tmp = TempDir::new().unwrap();
    intake(&tmp)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not an intake workspace"));
}

// ============================================================================
// Session status & reset
// ============================================================================

#[test]
fn test_status_of_new_workspace_is_fresh_draft() {
    let tmp = setup_workspace();
    intake(&tmp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("fresh-draft"))
        .stdout(predicate::str::contains("1 of 4"));
}

#[test]
fn test_status_json() {
    let tmp = setup_workspace();
    let output = intake(&tmp)
        .args(["status", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let view: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(view["mode"], "fresh-draft");
    assert_eq!(view["step"], 1);
    assert_eq!(view["total_steps"], 4);
}

#[test]
fn test_status_for_unknown_correction_link_is_inactive() {
    let tmp = setup_workspace();
    intake(&tmp)
        .args(["status", "--request", "APP-01UNKNOWN"])
        .assert()
        .success()
        .stdout(predicate::str::contains("inactive"))
        .stdout(predicate::str::contains("Link not recognized"));
}

#[test]
fn test_reset_with_yes() {
    let tmp = setup_workspace();
    intake(&tmp)
        .args(["reset", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Session reset"));
}

#[test]
fn test_workspace_flag_from_another_directory() {
    let tmp = setup_workspace();
    let elsewhere = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("intake").unwrap();
    cmd.current_dir(elsewhere.path())
        .env("XDG_CONFIG_HOME", elsewhere.path().join("xdg"))
        .args(["status", "--workspace"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("fresh-draft"));
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn test_cache_status_on_empty_cache() {
    let tmp = setup_workspace();
    intake(&tmp)
        .args(["cache", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache Status"))
        .stdout(predicate::str::contains("session.db"));
}

#[test]
fn test_cache_clear() {
    let tmp = setup_workspace();
    intake(&tmp)
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache cleared"));

    intake(&tmp)
        .args(["cache", "clear", "--draft-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Draft cleared"));
}

#[test]
fn test_corrupt_session_cache_starts_fresh() {
    let tmp = setup_workspace();
    fs::write(tmp.path().join(".intake/session.db"), vec![0xAB_u8; 4096]).unwrap();

    intake(&tmp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("fresh-draft"))
        .stdout(predicate::str::contains("1 of 4"));

    intake(&tmp)
        .args(["cache", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache Status"));
}

// ============================================================================
// Review
// ============================================================================

#[test]
fn test_review_list_empty() {
    let tmp = setup_workspace();
    intake(&tmp)
        .args(["review", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No registrations found"));
}

#[test]
fn test_review_list_rejects_unknown_status() {
    let tmp = setup_workspace();
    intake(&tmp)
        .args(["review", "list", "--status", "archived"])
        .assert()
        .failure();
}

#[test]
fn test_review_unknown_record_fails() {
    let tmp = setup_workspace();
    intake(&tmp)
        .args(["review", "show", "APP-01ARZ3NDEKTSV4RRFFQ69G5FAV"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    intake(&tmp)
        .args(["review", "approve", "APP-01ARZ3NDEKTSV4RRFFQ69G5FAV"])
        .assert()
        .failure();

    intake(&tmp)
        .args([
            "review",
            "request-correction",
            "APP-01ARZ3NDEKTSV4RRFFQ69G5FAV",
            "--note",
            "Photo illisible",
        ])
        .assert()
        .failure();
}

#[test]
fn test_review_rejects_malformed_ids() {
    let tmp = setup_workspace();
    intake(&tmp)
        .args(["review", "show", "REQ-01ARZ3NDEKTSV4RRFFQ69G5FAV"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid application prefix"));

    intake(&tmp)
        .args(["review", "approve", "APP-12"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid ULID"));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_show_defaults() {
    let tmp = setup_workspace();
    intake(&tmp)
        .args(["config", "show", "draft_ttl_hours"])
        .assert()
        .success()
        .stdout("24\n");

    intake(&tmp)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("submission_ttl_hours: 48"))
        .stdout(predicate::str::contains("identity.maritalStatus"));
}

#[test]
fn test_config_layers_workspace_then_env() {
    let tmp = setup_workspace();
    fs::write(
        tmp.path().join(".intake/config.yaml"),
        "draft_ttl_hours: 12\nretired_fields:\n  - address.street\n",
    )
    .unwrap();

    intake(&tmp)
        .args(["config", "show", "draft_ttl_hours"])
        .assert()
        .success()
        .stdout("12\n");

    intake(&tmp)
        .env("INTAKE_DRAFT_TTL_HOURS", "6")
        .args(["config", "show", "draft_ttl_hours"])
        .assert()
        .success()
        .stdout("6\n");

    intake(&tmp)
        .args(["config", "show", "retired_fields"])
        .assert()
        .success()
        .stdout(predicate::str::contains("address.street"));
}

#[test]
fn test_config_show_unknown_key_fails() {
    let tmp = setup_workspace();
    intake(&tmp)
        .args(["config", "show", "editor"])
        .assert()
        .failure();
}
