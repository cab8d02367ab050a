//! Service controller backed by the host service manager.
use std::{
    io::Read,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use strum_macros::{AsRefStr, Display, EnumString};
use tracing::{debug, warn};

use crate::{config::ServiceControlSettings, constants::CHILD_POLL_INTERVAL};

/// How long to keep reading a child's output after it exits.
const OUTPUT_GRACE: Duration = Duration::from_millis(500);

/// Point-in-time supervision status of the monitored service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ServiceState {
    Active,
    Activating,
    Inactive,
    Failed,
    Unknown,
}

impl ServiceState {
    /// Parses `systemctl is-active` output; anything unrecognised is `Unknown`.
    pub fn from_output(output: &str) -> Self {
        output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .and_then(|line| line.parse().ok())
            .unwrap_or(ServiceState::Unknown)
    }

    /// Whether this state warrants a restart regardless of the heartbeat.
    pub fn needs_restart(&self) -> bool {
        !matches!(self, ServiceState::Active | ServiceState::Activating)
    }
}

/// Result of a single restart invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl RestartOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            error: None,
        }
    }

    pub fn failed(exit_code: Option<i32>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code,
            error: Some(error.into()),
        }
    }

    /// One-line description for notifications.
    pub fn describe(&self) -> String {
        match (self.success, self.exit_code, self.error.as_deref()) {
            (true, _, _) => "restarted successfully".into(),
            (false, Some(code), Some(err)) if !err.is_empty() => {
                format!("restart failed (code {code}): {err}")
            }
            (false, Some(code), _) => format!("restart failed (code {code})"),
            (false, None, Some(err)) => format!("restart failed: {err}"),
            (false, None, None) => "restart failed".into(),
        }
    }
}

/// Restarts and inspects the monitored service.
///
/// Implementations invoke the underlying primitive exactly once per call;
/// retries are left to the supervisor's next tick so the cooldown gate sees
/// every attempt.
pub trait ServiceController: Send + Sync {
    fn restart(&self, reason: &str) -> RestartOutcome;
    fn query_state(&self) -> ServiceState;
}

impl<T: ServiceController + ?Sized> ServiceController for std::sync::Arc<T> {
    fn restart(&self, reason: &str) -> RestartOutcome {
        (**self).restart(reason)
    }

    fn query_state(&self) -> ServiceState {
        (**self).query_state()
    }
}

/// Drives a named unit through external commands (`systemctl` by default).
#[derive(Debug, Clone)]
pub struct CommandController {
    service: String,
    settings: ServiceControlSettings,
}

impl CommandController {
    pub fn new(service: impl Into<String>, settings: ServiceControlSettings) -> Self {
        Self {
            service: service.into(),
            settings,
        }
    }

    fn command(&self, argv: &[String]) -> Command {
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .arg(&self.service)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl ServiceController for CommandController {
    fn restart(&self, reason: &str) -> RestartOutcome {
        debug!("Restarting '{}' ({reason})", self.service);
        let child = match self.command(&self.settings.restart_command).spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!("Failed to launch restart for '{}': {err}", self.service);
                return RestartOutcome::failed(None, err.to_string());
            }
        };

        match run_to_completion(child, self.settings.timeout) {
            Ok(CommandOutput {
                status: Some(status),
                stderr,
                ..
            }) if status.success() => {
                if !stderr.trim().is_empty() {
                    debug!("Restart of '{}' wrote to stderr: {}", self.service, stderr.trim());
                }
                RestartOutcome::succeeded()
            }
            Ok(CommandOutput {
                status: Some(status),
                stderr,
                ..
            }) => RestartOutcome::failed(status.code(), stderr.trim()),
            Ok(CommandOutput { status: None, .. }) => RestartOutcome::failed(
                None,
                format!("timed out after {:?}", self.settings.timeout),
            ),
            Err(err) => RestartOutcome::failed(None, err.to_string()),
        }
    }

    fn query_state(&self) -> ServiceState {
        let child = match self.command(&self.settings.state_command).spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!("Failed to query state of '{}': {err}", self.service);
                return ServiceState::Unknown;
            }
        };

        // `is-active` exits non-zero for every state but `active`, so the exit
        // status is ignored and only stdout is interpreted.
        match run_to_completion(child, self.settings.timeout) {
            Ok(CommandOutput {
                status: Some(_),
                stdout,
                ..
            }) => ServiceState::from_output(&stdout),
            Ok(CommandOutput { status: None, .. }) => {
                warn!("State query for '{}' timed out", self.service);
                ServiceState::Unknown
            }
            Err(err) => {
                warn!("State query for '{}' failed: {err}", self.service);
                ServiceState::Unknown
            }
        }
    }
}

/// Captured result of a child process. `status` is `None` on timeout.
#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
}

/// Waits for `child` up to `timeout`, killing it when the deadline passes.
///
/// Output is drained on helper threads so a chatty child cannot block on a
/// full pipe while we poll.
pub(crate) fn run_to_completion(
    mut child: Child,
    timeout: Duration,
) -> std::io::Result<CommandOutput> {
    let stdout_reader = child.stdout.take().map(drain);
    let stderr_reader = child.stderr.take().map(drain);

    let status = match wait_with_timeout(&mut child, timeout)? {
        Some(status) => Some(status),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            None
        }
    };

    // A backgrounded grandchild can keep the pipe open indefinitely; give the
    // readers a short grace period and drop whatever has not finished.
    let grace_deadline = Instant::now() + OUTPUT_GRACE;
    let collect = |reader: Option<thread::JoinHandle<String>>| {
        let handle = reader?;
        while !handle.is_finished() {
            if Instant::now() >= grace_deadline {
                return None;
            }
            thread::sleep(CHILD_POLL_INTERVAL);
        }
        handle.join().ok()
    };
    let stdout = collect(stdout_reader).unwrap_or_default();
    let stderr = collect(stderr_reader).unwrap_or_default();

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = String::new();
        let _ = pipe.read_to_string(&mut buffer);
        buffer
    })
}

/// Wait for a child process with a timeout, returning `Ok(None)` on timeout.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait()? {
            Some(status) => return Ok(Some(status)),
            None => {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                thread::sleep(CHILD_POLL_INTERVAL);
            }
        }
    }
}
