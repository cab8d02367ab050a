#[path = "common/mod.rs"]
mod common;

use std::fs;

use assert_cmd::Command;
use chrono::Utc;
use common::write_deployment;
use predicates::str::contains;
use pulsewatch::heartbeat::{HeartbeatFormat, check_liveness, parse_timestamp};
use tempfile::tempdir;

#[test]
fn beat_once_writes_a_parseable_timestamp() {
    let temp = tempdir().expect("failed to create tempdir");
    let path = temp.path().join("nested/heartbeat.log");

    Command::new(assert_cmd::cargo::cargo_bin!("pulsewatch"))
        .args(["beat", "--once", "--timezone", "America/New_York", "--path"])
        .arg(&path)
        .assert()
        .success();

    let content = fs::read_to_string(&path).expect("heartbeat not written");
    let written = parse_timestamp(&content).expect("heartbeat not parseable");
    let age = Utc::now() - written;
    assert!(age.num_seconds() >= 0 && age.num_seconds() < 60);
    assert!(content.trim_end().ends_with("-05:00") || content.trim_end().ends_with("-04:00"));

    let liveness = check_liveness(&path, 150.0, HeartbeatFormat::Timestamp);
    assert!(liveness.ok);
}

#[test]
fn beat_rejects_unknown_timezone() {
    let temp = tempdir().expect("failed to create tempdir");

    Command::new(assert_cmd::cargo::cargo_bin!("pulsewatch"))
        .args(["beat", "--once", "--timezone", "Mars/Olympus", "--path"])
        .arg(temp.path().join("heartbeat.log"))
        .assert()
        .failure()
        .stderr(contains("invalid timezone"));
}

#[test]
fn beat_keeps_a_watched_service_healthy() {
    let temp = tempdir().expect("failed to create tempdir");
    let deployment = write_deployment(temp.path(), 3, &[]);

    Command::new(assert_cmd::cargo::cargo_bin!("pulsewatch"))
        .args(["beat", "--once", "--path"])
        .arg(&deployment.heartbeat)
        .assert()
        .success();

    Command::new(assert_cmd::cargo::cargo_bin!("pulsewatch"))
        .arg("check")
        .arg("--config")
        .arg(&deployment.config)
        .assert()
        .success()
        .stdout(contains("heartbeat: fresh"));

    assert!(!deployment.restarts.exists());
}
