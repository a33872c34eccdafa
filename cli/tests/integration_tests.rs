//! Integration tests for the terraudit CLI
//!
//! These tests drive the binary against real temporary Terraform trees.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

/// A small repository with one compliant and one non-compliant resource
fn create_test_repo() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path();

    fs::create_dir_all(base.join("terraform/prod")).unwrap();
    fs::create_dir_all(base.join("terraform/dev")).unwrap();

    fs::write(
        base.join("terraform/prod/s3.tf"),
        r#"resource "aws_s3_bucket" "secure_data" {
  bucket                 = "secure-data"
  server_side_encryption = "aws:kms"
}
"#,
    )
    .unwrap();

    fs::write(
        base.join("terraform/dev/open_sg.tf"),
        r#"resource "aws_security_group" "open" {
  description = "wide open"
  cidr_blocks = ["0.0.0.0/0"]
}
"#,
    )
    .unwrap();

    temp_dir
}

fn terraudit() -> Command {
    Command::cargo_bin("terraudit").unwrap()
}

#[test]
fn build_reports_resource_count() {
    let repo = create_test_repo();

    terraudit()
        .arg("build")
        .arg(repo.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Resources:  2"));

    assert!(repo.path().join(".terraudit/index.json.gz").exists());
}

#[test]
fn validate_after_build_is_up_to_date() {
    let repo = create_test_repo();

    terraudit().arg("build").arg(repo.path()).assert().success();
    terraudit()
        .arg("validate")
        .arg(repo.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));
}

#[test]
fn validate_detects_new_file() {
    let repo = create_test_repo();
    terraudit().arg("build").arg(repo.path()).assert().success();

    fs::write(
        repo.path().join("terraform/prod/extra.tf"),
        "resource \"aws_vpc\" \"v\" {\n}\n",
    )
    .unwrap();

    terraudit()
        .arg("validate")
        .arg(repo.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("file_added"));
}

#[test]
fn query_by_control_finds_the_bucket() {
    let repo = create_test_repo();

    terraudit()
        .arg("query")
        .arg(repo.path())
        .args(["--control", "CC6.8"])
        .assert()
        .success()
        .stdout(predicate::str::contains("aws_s3_bucket.secure_data"));
}

#[test]
fn query_by_compliance_status() {
    let repo = create_test_repo();

    terraudit()
        .arg("query")
        .arg(repo.path())
        .args(["--compliance", "non_compliant"])
        .assert()
        .success()
        .stdout(predicate::str::contains("aws_security_group.open"))
        .stdout(predicate::str::contains("aws_s3_bucket.secure_data").not());
}

#[test]
fn query_json_output_is_parseable() {
    let repo = create_test_repo();

    let output = terraudit()
        .arg("query")
        .arg(repo.path())
        .args(["--environment", "prod", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["count"], 1);
    assert_eq!(
        parsed["resources"][0]["id"],
        "aws_s3_bucket.secure_data"
    );
}

#[test]
fn query_unknown_framework_fails_with_message() {
    let repo = create_test_repo();

    terraudit()
        .arg("query")
        .arg(repo.path())
        .args(["--framework", "HIPAA"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown framework"));
}

#[test]
fn query_unknown_risk_level_is_rejected() {
    let repo = create_test_repo();

    terraudit()
        .arg("query")
        .arg(repo.path())
        .args(["--risk", "catastrophic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown risk level"));
}

#[test]
fn query_sort_and_limit() {
    let repo = create_test_repo();

    let output = terraudit()
        .arg("query")
        .arg(repo.path())
        .args(["--sort", "risk", "--desc", "--limit", "1", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["count"], 1);
    assert_eq!(parsed["resources"][0]["risk_level"], "high");
}

#[test]
fn stats_shows_distributions() {
    let repo = create_test_repo();

    terraudit()
        .arg("stats")
        .arg(repo.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("By risk"))
        .stdout(predicate::str::contains("high"))
        .stdout(predicate::str::contains("By environment"))
        .stdout(predicate::str::contains("prod"));
}

#[test]
fn build_no_cache_rebuilds() {
    let repo = create_test_repo();

    terraudit().arg("build").arg(repo.path()).assert().success();
    terraudit()
        .arg("build")
        .arg(repo.path())
        .arg("--no-cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("Resources:  2"));
}
