#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// Paths used by a throwaway watchdog deployment.
pub struct Deployment {
    pub config: PathBuf,
    pub heartbeat: PathBuf,
    pub restarts: PathBuf,
    pub socket: PathBuf,
    pub state_file: PathBuf,
}

/// Writes a config whose restart command appends the unit name to `restarts.log`.
pub fn write_deployment(dir: &Path, max_restarts: u32, admin_ids: &[u64]) -> Deployment {
    let deployment = Deployment {
        config: dir.join("pulsewatch.yaml"),
        heartbeat: dir.join("heartbeat.log"),
        restarts: dir.join("restarts.log"),
        socket: dir.join("control.sock"),
        state_file: dir.join("live_state.txt"),
    };

    let admins = admin_ids
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    let yaml = format!(
        r#"service: demo.service
timezone: UTC
heartbeat:
  path: {heartbeat}
  max_idle: 150m
cooldown:
  max_restarts: {max_restarts}
  window: 6h
disk:
  path: {dir}
  threshold_percent: 100
summary:
  enabled: false
control:
  socket: {socket}
  state_file: {state_file}
  admin_ids: [{admins}]
service_control:
  restart_command:
    - sh
    - -c
    - 'echo "$1" >> {restarts}'
    - sh
  state_command:
    - sh
    - -c
    - echo active
    - sh
  timeout: 5s
"#,
        heartbeat = deployment.heartbeat.display(),
        dir = dir.display(),
        socket = deployment.socket.display(),
        state_file = deployment.state_file.display(),
        restarts = deployment.restarts.display(),
    );
    fs::write(&deployment.config, yaml).expect("failed to write config");
    deployment
}

/// Uid the control socket will see for clients spawned by this test.
pub fn current_uid() -> u64 {
    u64::from(nix::unistd::getuid().as_raw())
}

pub fn wait_for_path(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if path.exists() {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    panic!("Timed out waiting for {:?} to exist", path);
}

pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
