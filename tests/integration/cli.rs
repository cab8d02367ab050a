use assert_cmd::Command;
use predicates::str::contains;

fn pulsewatch() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("pulsewatch"))
}

#[test]
fn help_lists_every_command() {
    let output = pulsewatch().arg("--help").output().expect("failed to run --help");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["run", "check", "status", "toggle", "restart", "panel", "beat"] {
        assert!(stdout.contains(command), "help is missing `{command}`");
    }
}

#[test]
fn version_matches_package() {
    pulsewatch()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn invalid_log_level_is_rejected() {
    pulsewatch()
        .args(["--log-level", "loud", "check"])
        .assert()
        .failure()
        .stderr(contains("invalid log level"));
}

#[test]
fn unknown_command_is_rejected() {
    pulsewatch().arg("stop").assert().failure();
}
