#[path = "common/mod.rs"]
mod common;

use std::{
    fs,
    io::{BufRead, BufReader, Write},
    os::unix::net::UnixStream,
    process::{Child, Command as StdCommand, Stdio},
    time::Duration,
};

use assert_cmd::Command;
use common::{Deployment, current_uid, read_lines, wait_for_path, write_deployment};
use nix::{
    sys::signal::{Signal, kill},
    unistd::Pid,
};
use predicates::str::contains;
use tempfile::tempdir;

struct Watchdog(Child);

impl Watchdog {
    fn start(deployment: &Deployment) -> Self {
        Self::spawn(deployment, Stdio::null())
    }

    fn spawn(deployment: &Deployment, stderr: Stdio) -> Self {
        let child = StdCommand::new(assert_cmd::cargo::cargo_bin!("pulsewatch"))
            .arg("run")
            .arg("--config")
            .arg(&deployment.config)
            .stdout(Stdio::null())
            .stderr(stderr)
            .spawn()
            .expect("failed to start watchdog");
        wait_for_path(&deployment.socket);
        Watchdog(child)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn control(deployment: &Deployment, args: &[&str]) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pulsewatch"));
    cmd.args(args).arg("--socket").arg(&deployment.socket);
    cmd
}

/// Writes one raw request line and returns the raw response line.
fn send_raw(deployment: &Deployment, line: &str) -> String {
    let mut stream = UnixStream::connect(&deployment.socket).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("failed to set timeout");
    stream
        .write_all(format!("{line}\n").as_bytes())
        .expect("failed to write request");
    let mut response = String::new();
    BufReader::new(stream)
        .read_line(&mut response)
        .expect("failed to read response");
    response
}

#[test]
fn status_reaches_the_running_watchdog() {
    let temp = tempdir().expect("failed to create tempdir");
    let deployment = write_deployment(temp.path(), 3, &[]);
    let _watchdog = Watchdog::start(&deployment);

    control(&deployment, &["status"])
        .assert()
        .success()
        .stdout(contains("Service `demo.service`: active"));
}

#[test]
fn admin_uid_can_toggle_trading() {
    let temp = tempdir().expect("failed to create tempdir");
    let deployment = write_deployment(temp.path(), 3, &[current_uid()]);
    let _watchdog = Watchdog::start(&deployment);

    control(&deployment, &["toggle"])
        .assert()
        .success()
        .stdout(contains("Trading ENABLED"));
    assert_eq!(fs::read_to_string(&deployment.state_file).unwrap(), "true");
}

#[test]
fn non_admin_uid_cannot_toggle_trading() {
    let temp = tempdir().expect("failed to create tempdir");
    let deployment = write_deployment(temp.path(), 3, &[current_uid() + 1]);
    let _watchdog = Watchdog::start(&deployment);

    control(&deployment, &["toggle"])
        .assert()
        .failure()
        .stderr(contains("not authorized"));
    assert!(!deployment.state_file.exists());
}

#[test]
fn identity_in_the_request_body_does_not_grant_admin_rights() {
    let temp = tempdir().expect("failed to create tempdir");
    let admin = current_uid() + 1;
    let deployment = write_deployment(temp.path(), 3, &[admin]);
    let _watchdog = Watchdog::start(&deployment);

    let toggle = send_raw(
        &deployment,
        &format!(r#"{{"caller":{{"user_id":{admin},"role_ids":[]}},"command":"Toggle"}}"#),
    );
    assert!(toggle.contains("not authorized"), "unexpected reply: {toggle}");
    assert!(!deployment.state_file.exists());

    let restart = send_raw(
        &deployment,
        &format!(
            r#"{{"caller":{{"user_id":{admin},"role_ids":[]}},"command":{{"Restart":{{"reason":"forged"}}}}}}"#
        ),
    );
    assert!(restart.contains("not authorized"), "unexpected reply: {restart}");
    // Only the startup tick's restart for the missing heartbeat.
    assert_eq!(read_lines(&deployment.restarts), vec!["demo.service"]);
}

#[test]
fn manual_restart_goes_through_the_cooldown_gate() {
    let temp = tempdir().expect("failed to create tempdir");
    // The first heartbeat tick finds no heartbeat and uses the only slot.
    let deployment = write_deployment(temp.path(), 1, &[current_uid()]);
    let _watchdog = Watchdog::start(&deployment);

    control(&deployment, &["panel"])
        .assert()
        .success()
        .stdout(contains("Restarts in window: 1"));

    control(&deployment, &["restart", "--reason", "deploy"])
        .assert()
        .success()
        .stdout(contains("Cooldown active"));

    assert_eq!(read_lines(&deployment.restarts), vec!["demo.service"]);
}

#[test]
fn sigterm_shuts_down_cleanly_and_removes_the_socket() {
    let temp = tempdir().expect("failed to create tempdir");
    let deployment = write_deployment(temp.path(), 3, &[]);
    let mut watchdog = Watchdog::spawn(&deployment, Stdio::piped());

    // A served request means the loop and its signal handler are up.
    control(&deployment, &["status"]).assert().success();

    kill(Pid::from_raw(watchdog.0.id() as i32), Signal::SIGTERM).expect("failed to signal");
    let mut stderr = String::new();
    if let Some(pipe) = watchdog.0.stderr.take() {
        BufReader::new(pipe)
            .lines()
            .map_while(Result::ok)
            .for_each(|line| {
                stderr.push_str(&line);
                stderr.push('\n');
            });
    }
    let status = watchdog.0.wait().expect("failed to wait for watchdog");

    assert!(status.success(), "exit status {status:?}\n{stderr}");
    assert!(stderr.contains("going offline"), "stderr:\n{stderr}");
    assert!(!deployment.socket.exists());
}

#[test]
fn commands_fail_without_a_running_watchdog() {
    let temp = tempdir().expect("failed to create tempdir");
    let deployment = write_deployment(temp.path(), 3, &[]);

    control(&deployment, &["status"])
        .assert()
        .failure()
        .stderr(contains("no running pulsewatch watchdog"));
}
