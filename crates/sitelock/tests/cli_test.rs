#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Command isolated from the caller's environment and global config
fn sitelock(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("sitelock").unwrap();
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join("xdg"))
        .env("NO_COLOR", "1");
    for var in [
        "SITELOCK_CONFIG",
        "SITELOCK_NAME",
        "SITELOCK_BUCKET",
        "SITELOCK_DOMAIN",
        "SITELOCK_REGION",
        "SITELOCK_STRATEGY",
        "SITELOCK_SIMULATE",
        "SITELOCK_NO_LOG",
        "SITELOCK_MAX_ATTEMPTS",
        "SITELOCK_INTERVAL",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn simulated(dir: &TempDir) -> Command {
    let mut cmd = sitelock(dir);
    cmd.args(["--simulate", "--bucket", "site-assets", "--region", "ap-northeast-1"]);
    cmd
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let dir = tempfile::tempdir().unwrap();
    sitelock(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("閉じたまま公開する"))
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("teardown"))
        .stdout(predicate::str::contains("dns-alias"))
        .stdout(predicate::str::contains("unlock"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    let dir = tempfile::tempdir().unwrap();
    sitelock(&dir)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sitelock"));
}

/// lockコマンドのヘルプに --allow があることを確認
#[test]
fn test_lock_help() {
    let dir = tempfile::tempdir().unwrap();
    sitelock(&dir)
        .args(["lock", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--allow"));
}

#[test]
fn test_provision_simulated() {
    let dir = tempfile::tempdir().unwrap();
    simulated(&dir)
        .args(["--operator", "203.0.113.0/24", "provision"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bucket:site-assets"))
        .stdout(predicate::str::contains("distribution_id"))
        .stdout(predicate::str::contains("created"));

    let log = fs::read_to_string(dir.path().join(".sitelock").join("runs.log")).unwrap();
    assert!(log.contains("\"event\":\"run_started\""));
    assert!(log.contains("\"operation\":\"provision\""));
}

#[test]
fn test_provision_with_domain_simulated() {
    let dir = tempfile::tempdir().unwrap();
    simulated(&dir)
        .args([
            "--domain",
            "docs.example.com",
            "--no-log",
            "provision",
        ])
        .env("SITELOCK_STRATEGY", "bucket-policy")
        .args(["--operator", "198.51.100.7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dns-alias"))
        .stdout(predicate::str::contains("certificate_arn"));

    assert!(!dir.path().join(".sitelock").exists());
}

#[test]
fn test_provision_with_empty_allow_list_fails() {
    let dir = tempfile::tempdir().unwrap();
    simulated(&dir)
        .args(["--no-log", "provision"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("access-restriction"))
        .stderr(predicate::str::contains("allow-list would be empty"))
        .stderr(predicate::str::contains("origin-access"));
}

#[test]
fn test_invalid_bucket_rejected() {
    let dir = tempfile::tempdir().unwrap();
    sitelock(&dir)
        .args([
            "--simulate",
            "--bucket",
            "Site_Assets",
            "--region",
            "us-west-2",
            "provision",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("エラー"));
}

#[test]
fn test_missing_region_reported() {
    let dir = tempfile::tempdir().unwrap();
    sitelock(&dir)
        .args(["--simulate", "--bucket", "site-assets", "provision"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("site.region"));
}

#[test]
fn test_lock_without_distribution_names_resource() {
    let dir = tempfile::tempdir().unwrap();
    simulated(&dir)
        .args(["--no-log", "lock", "--allow", "1.2.3.4"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("lookup-distribution"))
        .stderr(predicate::str::contains("distribution:site-assets"));
}

#[test]
fn test_unlock_requires_sources() {
    let dir = tempfile::tempdir().unwrap();
    simulated(&dir).arg("unlock").assert().code(2);
}

#[test]
fn test_unlock_rejects_bad_source() {
    let dir = tempfile::tempdir().unwrap();
    simulated(&dir)
        .args(["unlock", "--allow", "not-an-address"])
        .assert()
        .code(1);
}

#[test]
fn test_teardown_needs_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    simulated(&dir)
        .arg("teardown")
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"))
        .stdout(predicate::str::contains("bucket:site-assets"));

    assert!(!dir.path().join(".sitelock").exists());
}

#[test]
fn test_teardown_of_missing_site_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    simulated(&dir)
        .args(["--no-log", "teardown", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("変更はありません"));
}

#[test]
fn test_site_file_in_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("sitelock.yaml"),
        "site: { name: docs, bucket: site-assets, region: us-west-2 }\n\
         access: { operator: [203.0.113.0/24] }\n",
    )
    .unwrap();

    sitelock(&dir)
        .args(["--simulate", "--no-log", "provision"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sitelock.yaml"))
        .stdout(predicate::str::contains("サイト: docs"));
}

#[test]
fn test_env_config_pointing_nowhere() {
    let dir = tempfile::tempdir().unwrap();
    sitelock(&dir)
        .env("SITELOCK_CONFIG", dir.path().join("missing.yaml"))
        .args(["--simulate", "provision"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("SITELOCK_CONFIG"));
}

#[test]
fn test_bucket_from_env() {
    let dir = tempfile::tempdir().unwrap();
    sitelock(&dir)
        .env("SITELOCK_BUCKET", "env-assets")
        .env("SITELOCK_REGION", "eu-west-1")
        .args(["--simulate", "--no-log", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("env-assets"));
}

#[test]
fn test_status_json() {
    let dir = tempfile::tempdir().unwrap();
    let output = simulated(&dir)
        .args(["--domain", "docs.example.com", "status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["bucket"], "site-assets");
    assert_eq!(status["auth"].as_array().unwrap().len(), 4);
    let resources = status["resources"].as_array().unwrap();
    assert!(!resources.is_empty());
    assert!(resources.iter().all(|r| r["state"].is_null()));
}
