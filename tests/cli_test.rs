use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

const MODULE: &str = r#"
name: Lock
actions:
  - id: lock
    contract: Lock
    args: [{ param: unlockTime }]
  - call: lock
    method: withdraw
"#;

fn workspace(method_in_abi: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    fs::create_dir(root.join("artifacts")).unwrap();
    fs::write(
        root.join("artifacts/Lock.json"),
        format!(
            r#"{{"contractName": "Lock", "bytecode": "0x6080", "abi": [{{"type": "function", "name": "{}"}}]}}"#,
            method_in_abi
        ),
    )
    .unwrap();
    fs::write(root.join("lock.yml"), MODULE).unwrap();
    fs::write(root.join("params.json"), r#"{"unlockTime": 1893456000}"#).unwrap();
    fs::write(root.join("deployflow.yml"), "engine:\n  poll_interval_ms: 1\n").unwrap();
    dir
}

fn deployflow(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("deployflow").unwrap();
    cmd.current_dir(dir).env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_plan_prints_vertices_in_order() {
    let dir = workspace("withdraw");

    deployflow(dir.path())
        .args(["plan", "lock.yml", "--parameters", "params.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[contract-deploy] Lock#Lock"))
        .stdout(predicate::str::contains("[contract-call] Lock#Lock.withdraw  (after Lock#Lock)"));
}

#[test]
fn test_plan_reports_missing_parameters() {
    let dir = workspace("withdraw");

    deployflow(dir.path())
        .args(["plan", "lock.yml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "module requires parameter \"unlockTime\"",
        ));
}

#[test]
fn test_deploy_writes_journal() {
    let dir = workspace("withdraw");

    deployflow(dir.path())
        .args(["deploy", "lock.yml", "--parameters", "params.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Lock#Lock"))
        .stdout(predicate::str::contains("0x"));

    assert!(dir.path().join(".deployflow/deployments/latest.json").exists());

    deployflow(dir.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("2/2 completed"));
}

#[test]
fn test_failed_deploy_exits_non_zero() {
    let dir = workspace("deposit");

    deployflow(dir.path())
        .args(["deploy", "lock.yml", "--parameters", "params.json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED"))
        .stderr(predicate::str::contains("deployment incomplete: 1 failed, 0 skipped"));
}
