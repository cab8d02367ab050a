#[path = "common/mod.rs"]
mod common;

use std::fs;

use assert_cmd::Command;
use chrono::{Duration as ChronoDuration, Utc};
use common::{read_lines, write_deployment};
use predicates::str::contains;
use tempfile::tempdir;

fn check(config: &std::path::Path) -> assert_cmd::assert::Assert {
    Command::new(assert_cmd::cargo::cargo_bin!("pulsewatch"))
        .arg("check")
        .arg("--config")
        .arg(config)
        .assert()
}

#[test]
fn missing_heartbeat_restarts_the_unit() {
    let temp = tempdir().expect("failed to create tempdir");
    let deployment = write_deployment(temp.path(), 3, &[]);

    check(&deployment.config)
        .success()
        .stdout(contains("heartbeat: missing heartbeat"))
        .stdout(contains("restart: Restarted"));

    assert_eq!(read_lines(&deployment.restarts), vec!["demo.service"]);
}

#[test]
fn stale_heartbeat_restarts_the_unit() {
    let temp = tempdir().expect("failed to create tempdir");
    let deployment = write_deployment(temp.path(), 3, &[]);
    let stale = Utc::now() - ChronoDuration::minutes(151);
    fs::write(&deployment.heartbeat, stale.to_rfc3339()).unwrap();

    check(&deployment.config)
        .success()
        .stdout(contains("stale heartbeat"))
        .stdout(contains("restart: Restarted"));

    assert_eq!(read_lines(&deployment.restarts).len(), 1);
}

#[test]
fn fresh_heartbeat_leaves_the_unit_alone() {
    let temp = tempdir().expect("failed to create tempdir");
    let deployment = write_deployment(temp.path(), 3, &[]);
    let fresh = Utc::now() - ChronoDuration::minutes(149);
    fs::write(&deployment.heartbeat, fresh.to_rfc3339()).unwrap();

    check(&deployment.config)
        .success()
        .stdout(contains("service: active"))
        .stdout(contains("heartbeat: fresh"));

    assert!(!deployment.restarts.exists());
}

#[test]
fn zero_max_restarts_denies_every_restart() {
    let temp = tempdir().expect("failed to create tempdir");
    let deployment = write_deployment(temp.path(), 0, &[]);

    check(&deployment.config)
        .success()
        .stdout(contains("restart: Denied"));

    assert!(!deployment.restarts.exists());
}

#[test]
fn unparseable_heartbeat_is_a_liveness_failure() {
    let temp = tempdir().expect("failed to create tempdir");
    let deployment = write_deployment(temp.path(), 3, &[]);
    fs::write(&deployment.heartbeat, "not a timestamp").unwrap();

    check(&deployment.config)
        .success()
        .stdout(contains("parse error"))
        .stdout(contains("restart: Restarted"));
}

#[test]
fn invalid_config_fails_fast() {
    let temp = tempdir().expect("failed to create tempdir");
    let config = temp.path().join("pulsewatch.yaml");
    fs::write(
        &config,
        "service: demo.service\nheartbeat:\n  path: hb\ndisk:\n  threshold_percent: 150\n",
    )
    .unwrap();

    check(&config).failure().stderr(contains("threshold_percent"));
}

#[test]
fn missing_config_fails_fast() {
    let temp = tempdir().expect("failed to create tempdir");
    check(&temp.path().join("absent.yaml")).failure();
}
