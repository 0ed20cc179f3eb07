//! Smoke tests for the paysync binary

#![allow(deprecated)] // Command::cargo_bin
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn paysync() -> Command {
    let mut cmd = Command::cargo_bin("paysync").expect("paysync binary should exist");
    cmd.env_remove("PAYSYNC_CONFIG")
        .env_remove("PAYSYNC_BASE_URL")
        .env_remove("PAYSYNC_HEADLESS")
        .env_remove("PAYSYNC_CHROMIUM_PATH");
    cmd
}

const PAYMENT_FEATURE: &str = r#"feature: Payments
background:
  - Given login and access payments page
scenarios:
  - name: Pay groceries
    tags: [smoke]
    steps:
      - step: When I make a payment with the following data
        table:
          - ACCOUNT: Main Account
            REFERENCE: REF-1
            ENTITY: "12345"
            AMOUNT: 50
            CATEGORY: Groceries
      - Then Verify confirmation window appears with payment details
      - When I click to proceed with payment
      - Then Verify success payment page appears
      - And Verify new transaction appears with "Groceries" category and 50 amount
"#;

const BROKEN_FEATURE: &str = r"feature: Broken
scenarios:
  - name: Wrong step
    steps:
      - Given I am logged in
      - When I transfer everything to my cousin
";

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    paysync()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_flag() {
    paysync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_no_args_fails() {
    paysync().assert().failure();
}

#[test]
fn test_run_requires_features() {
    paysync().arg("run").assert().failure();
}

// ============================================================================
// Check
// ============================================================================

#[test]
fn test_check_valid_feature() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "payments.yaml", PAYMENT_FEATURE);
    paysync()
        .args(["--color", "never", "check"])
        .arg(&path)
        .assert()
        .success()
        .stderr(predicate::str::contains("Payments (1 scenarios)"));
}

#[test]
fn test_check_gherkin_feature() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "login.feature",
        "Feature: Login\n\n  Scenario: Dashboard\n    Given I am logged in\n    When I fly\n",
    );
    paysync()
        .args(["--color", "never", "check"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("When I fly"));
}

#[test]
fn test_check_reports_undefined_step() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "broken.yaml", BROKEN_FEATURE);
    paysync()
        .args(["--color", "never", "check"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Wrong step"))
        .stderr(predicate::str::contains("1 invalid step(s)"));
}

#[test]
fn test_check_missing_file() {
    paysync()
        .args(["check", "/nonexistent/payments.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read"));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_defaults() {
    paysync()
        .args(["config", "--defaults"])
        .assert()
        .success()
        .stdout(predicate::str::contains("base_url: http://localhost:3000"))
        .stdout(predicate::str::contains("dropdown_policy"));
}

#[test]
fn test_config_from_file_and_env() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "suite.yaml", "base_url: https://staging.bank.test\n");
    paysync()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("https://staging.bank.test"));

    paysync()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .env("PAYSYNC_BASE_URL", "https://qa.bank.test")
        .assert()
        .success()
        .stdout(predicate::str::contains("https://qa.bank.test"));
}

#[test]
fn test_config_rejects_invalid_url() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "suite.yaml", "base_url: bank.test\n");
    paysync()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("base_url must be an http(s) URL"));
}

// ============================================================================
// Run
// ============================================================================

#[test]
fn test_run_refuses_invalid_features_before_launch() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "broken.yaml", BROKEN_FEATURE);
    paysync()
        .args(["--color", "never", "run"])
        .arg(&path)
        .arg("--output")
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 invalid step(s)"));
    assert!(!dir.path().join("out").exists());
}
