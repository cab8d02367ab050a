//! Supervisor loop that ties the watchdog together.
//!
//! A single thread owns every piece of mutable state. It wakes when the next
//! task is due (heartbeat check, disk check, daily summary) or when a control
//! request or shutdown arrives on its channel, so ticks never overlap and
//! control commands are handled between them.
use std::{
    any::Any,
    os::unix::net::UnixListener,
    panic::{self, AssertUnwindSafe},
    path::Path,
    sync::{
        Arc,
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    thread,
    time::Duration,
};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use sysinfo::System;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    config::Settings,
    constants::CONTROL_REPLY_TIMEOUT,
    control::{
        AdminAuthorizer, Capability, Caller, ControlCommand, ControlHandler, ControlResponse,
        ControlTarget, TradingState,
    },
    cooldown::{GateDecision, RestartEvent, RestartGate},
    disk::{CleanReport, ResourceMonitor},
    error::{TradingStateError, WatchdogError},
    heartbeat::{LivenessReason, LivenessResult, check_liveness_at},
    ipc::{self, ControlError, ControlRequest},
    notify::{
        Channel, DiscordTokenValidator, Notifier, TokenStatus, TokenValidator, build_notifier,
    },
    service::{CommandController, RestartOutcome, ServiceController, ServiceState},
};

/// Errors raised while bringing up the control listener.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Where the loop currently is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Checking,
    Restarting,
    Cleaning,
    Reporting,
}

/// Input delivered to the loop thread.
pub enum LoopEvent {
    /// A control request, the peer that sent it, and the channel its response goes back on.
    Control {
        caller: Caller,
        request: ControlRequest,
        reply: Sender<ControlResponse>,
    },
    /// Finish the in-flight task and exit.
    Shutdown,
}

/// What the restart path decided.
#[derive(Debug, Clone, PartialEq)]
pub enum RestartDecision {
    Restarted,
    Failed(RestartOutcome),
    Denied { recent: usize },
}

/// Result of one heartbeat check.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatTick {
    pub state: ServiceState,
    pub liveness: LivenessResult,
    /// Set when a restart was considered.
    pub restart: Option<RestartDecision>,
}

/// Result of one bot token check.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenTick {
    pub status: TokenStatus,
    /// Set when the token was rejected and a restart was considered.
    pub restart: Option<RestartDecision>,
}

/// Result of a combined heartbeat + token + disk pass.
#[derive(Debug, Default)]
pub struct TickReport {
    pub heartbeat: Option<HeartbeatTick>,
    /// `None` when no bot token is configured.
    pub token: Option<TokenTick>,
    pub cleanup: Option<CleanReport>,
    /// Tasks that failed or panicked, with their error.
    pub failures: Vec<(&'static str, String)>,
}

/// Next due time of every scheduled task.
#[derive(Debug, Clone)]
struct TaskSchedule {
    heartbeat: DateTime<Utc>,
    disk: DateTime<Utc>,
    summary: Option<DateTime<Utc>>,
}

/// Long-lived watchdog for a single service.
pub struct Supervisor {
    settings: Settings,
    notifier: Box<dyn Notifier>,
    controller: Box<dyn ServiceController>,
    monitor: ResourceMonitor,
    token: Option<Box<dyn TokenValidator>>,
    gate: RestartGate,
    trading: TradingState,
    control: Arc<ControlHandler>,
    phase: Phase,
    started_at: DateTime<Utc>,
    last_heartbeat: Option<HeartbeatTick>,
    schedule: TaskSchedule,
}

impl Supervisor {
    /// Builds a supervisor with the production notifier, controller and disk monitor.
    pub fn new(settings: Settings) -> Result<Self, WatchdogError> {
        let notifier = build_notifier(&settings.notify, settings.timezone)?;
        let controller = Box::new(CommandController::new(
            settings.service.clone(),
            settings.service_control.clone(),
        ));
        let monitor = ResourceMonitor::from_settings(&settings.disk);
        let token = match &settings.notify.discord {
            Some(discord) => Some(DiscordTokenValidator::new(discord, settings.notify.timeout)?),
            None => None,
        };

        let supervisor = Self::with_components(settings, notifier, controller, monitor);
        Ok(match token {
            Some(token) => supervisor.with_token_validator(Box::new(token)),
            None => supervisor,
        })
    }

    /// Builds a supervisor around caller-provided collaborators.
    pub fn with_components(
        settings: Settings,
        notifier: Box<dyn Notifier>,
        controller: Box<dyn ServiceController>,
        monitor: ResourceMonitor,
    ) -> Self {
        let gate = RestartGate::new(settings.cooldown);
        let trading = TradingState::load(settings.control.state_file.as_deref());
        let control = Arc::new(ControlHandler::new(Box::new(
            AdminAuthorizer::from_settings(&settings.control),
        )));
        let now = Utc::now();
        let summary = next_summary_after(&settings, now);

        Self {
            settings,
            notifier,
            controller,
            monitor,
            token: None,
            gate,
            trading,
            control,
            phase: Phase::Idle,
            started_at: now,
            last_heartbeat: None,
            schedule: TaskSchedule {
                heartbeat: now,
                disk: now,
                summary,
            },
        }
    }

    /// Enables the bot token check on the heartbeat cadence.
    pub fn with_token_validator(mut self, validator: Box<dyn TokenValidator>) -> Self {
        self.token = Some(validator);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn gate(&self) -> &RestartGate {
        &self.gate
    }

    pub fn trading_enabled(&self) -> bool {
        self.trading.enabled()
    }

    fn transition(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("Supervisor phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn notify(&self, channel: Channel, message: &str) {
        if !self.notifier.notify(channel, message) {
            warn!("Notification to '{channel}' was not delivered");
        }
    }

    /// Runs `task`, converting errors and panics into a report so the caller keeps going.
    fn guarded<T>(
        &mut self,
        task: &'static str,
        run: impl FnOnce(&mut Self) -> Result<T, String>,
    ) -> Result<T, String> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| run(&mut *self)));
        self.transition(Phase::Idle);

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                error!("{task} failed: {err}");
                self.notify(Channel::Logs, &format!("⚠️ {task} failed: {err}"));
                Err(err)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("{task} panicked: {message}");
                self.notify(Channel::Logs, &format!("💥 {task} crashed: {message}"));
                Err(message)
            }
        }
    }

    /// Checks service state and heartbeat at `now`, restarting when either is bad.
    pub fn heartbeat_tick_at(&mut self, now: DateTime<Utc>) -> Result<HeartbeatTick, String> {
        self.guarded("Heartbeat check", |sup| Ok(sup.check_and_restart(now)))
    }

    fn check_and_restart(&mut self, now: DateTime<Utc>) -> HeartbeatTick {
        self.transition(Phase::Checking);
        let state = self.controller.query_state();
        let liveness = check_liveness_at(
            &self.settings.heartbeat.path,
            self.settings.heartbeat.max_idle_minutes,
            self.settings.heartbeat.format,
            now,
        );
        debug!(
            "Service '{}' is {state}; heartbeat {} (idle {:.1} min)",
            self.settings.service, liveness.reason, liveness.idle_minutes
        );

        let failure = if state.needs_restart() {
            Some(format!("service state `{state}`"))
        } else if !liveness.ok {
            Some(match &liveness.reason {
                LivenessReason::Missing => "heartbeat file missing, possible crash".to_string(),
                LivenessReason::Stale => format!(
                    "no heartbeat detected in {} minutes",
                    liveness.idle_minutes as i64
                ),
                LivenessReason::ParseError(detail) => format!("heartbeat unreadable ({detail})"),
                LivenessReason::Fresh => "heartbeat check failed".to_string(),
            })
        } else {
            None
        };

        let restart = failure.map(|reason| {
            warn!("Liveness failure for '{}': {reason}", self.settings.service);
            self.notify(
                Channel::Logs,
                &format!("🚨 Liveness failure: {reason}. Attempting restart."),
            );
            self.request_restart(now, &reason)
        });

        let tick = HeartbeatTick {
            state,
            liveness,
            restart,
        };
        self.last_heartbeat = Some(tick.clone());
        tick
    }

    /// Validates the bot token, restarting the service when it is rejected.
    ///
    /// Returns `Ok(None)` when no validator is configured.
    pub fn token_tick_at(&mut self, now: DateTime<Utc>) -> Result<Option<TokenTick>, String> {
        if self.token.is_none() {
            return Ok(None);
        }
        self.guarded("Token check", |sup| Ok(sup.check_token(now)))
    }

    fn check_token(&mut self, now: DateTime<Utc>) -> Option<TokenTick> {
        self.transition(Phase::Checking);
        let status = self.token.as_ref()?.validate();

        let restart = match &status {
            TokenStatus::Valid { account } => {
                debug!("Bot token accepted for {account}");
                let local = now.with_timezone(&self.settings.timezone);
                self.notify(
                    Channel::Ops,
                    &format!(
                        "🟢 Token OK • Connected as **{account}** at {}",
                        local.format("%I:%M %p %Z")
                    ),
                );
                None
            }
            TokenStatus::Invalid { reason } => {
                warn!("Bot token check failed: {reason}");
                Some(self.request_restart(now, reason))
            }
        };

        Some(TokenTick { status, restart })
    }

    /// Routes a restart through the cooldown gate and reports the outcome.
    pub fn request_restart(&mut self, now: DateTime<Utc>, reason: &str) -> RestartDecision {
        self.transition(Phase::Restarting);
        let controller = &self.controller;
        let decision = self.gate.attempt(now, reason, || {
            let outcome = controller.restart(reason);
            (outcome.success, outcome)
        });

        let decision = match decision {
            GateDecision::Denied { recent } => {
                self.notify(
                    Channel::Logs,
                    &format!(
                        "🚫 Cooldown active: {recent} restart(s) within {}. Restart skipped ({reason}).",
                        format_duration(self.settings.cooldown.window)
                    ),
                );
                RestartDecision::Denied { recent }
            }
            GateDecision::Attempted(outcome) if outcome.success => {
                info!("Restarted '{}' ({reason})", self.settings.service);
                self.notify(
                    Channel::Logs,
                    &format!(
                        "🔁 **Auto-Restart Triggered**: `{}` restarted successfully. Reason: {reason}",
                        self.settings.service
                    ),
                );
                RestartDecision::Restarted
            }
            GateDecision::Attempted(outcome) => {
                error!("Restart of '{}' failed: {}", self.settings.service, outcome.describe());
                self.notify(
                    Channel::Logs,
                    &format!(
                        "⚠️ `{}` {}. Reason: {reason}",
                        self.settings.service,
                        outcome.describe()
                    ),
                );
                RestartDecision::Failed(outcome)
            }
        };

        self.transition(Phase::Checking);
        decision
    }

    /// Samples the disk and cleans when over threshold.
    pub fn disk_tick(&mut self) -> Result<Option<CleanReport>, String> {
        self.guarded("Disk check", |sup| {
            sup.transition(Phase::Cleaning);
            sup.monitor
                .clean_if_needed(sup.notifier.as_ref())
                .map_err(|err| err.to_string())
        })
    }

    /// Runs one heartbeat, token and disk check, each isolated from the others.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        match self.heartbeat_tick_at(now) {
            Ok(tick) => report.heartbeat = Some(tick),
            Err(err) => report.failures.push(("heartbeat", err)),
        }
        match self.token_tick_at(now) {
            Ok(tick) => report.token = tick,
            Err(err) => report.failures.push(("token", err)),
        }
        match self.disk_tick() {
            Ok(cleanup) => report.cleanup = cleanup,
            Err(err) => report.failures.push(("disk", err)),
        }

        report
    }

    /// Posts the daily status report.
    pub fn summary_at(&mut self, now: DateTime<Utc>) -> Result<(), String> {
        self.guarded("Daily summary", |sup| {
            sup.transition(Phase::Reporting);
            let report = sup.summary_report(now);
            sup.notify(Channel::Logs, &report);
            Ok(())
        })
    }

    fn summary_report(&self, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.settings.timezone);
        let load = System::load_average();
        let disk = match self.monitor.check_disk() {
            Ok(sample) => sample.to_string(),
            Err(err) => format!("unavailable ({err})"),
        };
        let state = self.controller.query_state();
        let liveness = check_liveness_at(
            &self.settings.heartbeat.path,
            self.settings.heartbeat.max_idle_minutes,
            self.settings.heartbeat.format,
            now,
        );
        let recent = self.gate.recent(now).len();
        let healthy = !state.needs_restart() && liveness.ok;

        format!(
            "{}\n📅 {}\n🕗 {}\n📊 CPU Load: `{:.2} {:.2} {:.2}`\n💽 Disk: `{disk}`\n\
             🤖 Service State: `{state}`\n❤️ Heartbeat: {} (idle {:.1} min)\n\
             🔁 Restarts in last {}: {recent}\n💹 Trading: {}\npulsewatch v{}",
            if healthy {
                "🟢 **All Systems Green: Daily Status**"
            } else {
                "🟠 **Daily Status: Attention Needed**"
            },
            local.format("%A, %B %d, %Y"),
            local.format("%I:%M %p %Z"),
            load.one,
            load.five,
            load.fifteen,
            liveness.reason,
            liveness.idle_minutes,
            format_duration(self.settings.cooldown.window),
            if self.trading.enabled() {
                "ENABLED"
            } else {
                "DISABLED"
            },
            env!("CARGO_PKG_VERSION"),
        )
    }

    /// Authorizes and executes a control command on the loop thread.
    pub fn handle_control(&mut self, caller: &Caller, command: &ControlCommand) -> ControlResponse {
        let control = Arc::clone(&self.control);
        let response = control.handle(caller, command, self);
        self.transition(Phase::Idle);
        response
    }

    /// Runs until a shutdown event arrives or every sender is dropped.
    pub fn run(&mut self, events: Receiver<LoopEvent>) {
        info!("pulsewatch supervising '{}'", self.settings.service);
        self.notify(
            Channel::Ops,
            &format!(
                "🟢 Watchdog started. Monitoring `{}`...",
                self.settings.service
            ),
        );

        let jitter = startup_jitter(self.settings.startup_jitter);
        let first = later(Utc::now(), jitter);
        self.schedule.heartbeat = first;
        self.schedule.disk = first;
        self.schedule.summary = next_summary_after(&self.settings, Utc::now());

        loop {
            self.run_due_tasks(Utc::now());

            let wait = self.time_until_next(Utc::now());
            match events.recv_timeout(wait) {
                Ok(LoopEvent::Control {
                    caller,
                    request,
                    reply,
                }) => {
                    let response = self.handle_control(&caller, &request.command);
                    if reply.send(response).is_err() {
                        debug!("Control client went away before the reply was sent");
                    }
                }
                Ok(LoopEvent::Shutdown) => {
                    info!("Shutdown requested");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Supervisor event channel closed; shutting down");
                    break;
                }
            }
        }

        self.notify(
            Channel::Ops,
            &format!("🔴 Watchdog going offline. `{}` is no longer monitored.", self.settings.service),
        );
    }

    fn run_due_tasks(&mut self, now: DateTime<Utc>) {
        if now >= self.schedule.heartbeat {
            let _ = self.heartbeat_tick_at(now);
            let _ = self.token_tick_at(now);
            self.schedule.heartbeat = later(Utc::now(), self.settings.heartbeat.check_interval);
        }

        if now >= self.schedule.disk {
            let _ = self.disk_tick();
            self.schedule.disk = later(Utc::now(), self.settings.disk.check_interval);
        }

        if let Some(due) = self.schedule.summary
            && now >= due
        {
            let _ = self.summary_at(now);
            self.schedule.summary = next_summary_after(&self.settings, Utc::now());
        }
    }

    fn time_until_next(&self, now: DateTime<Utc>) -> Duration {
        [
            Some(self.schedule.heartbeat),
            Some(self.schedule.disk),
            self.schedule.summary,
        ]
        .into_iter()
        .flatten()
        .min()
        .map(|due| (due - now).to_std().unwrap_or(Duration::ZERO))
        .unwrap_or(self.settings.heartbeat.check_interval)
    }
}

impl ControlTarget for Supervisor {
    fn status_report(&mut self) -> String {
        let now = Utc::now();
        let state = self.controller.query_state();
        let liveness = check_liveness_at(
            &self.settings.heartbeat.path,
            self.settings.heartbeat.max_idle_minutes,
            self.settings.heartbeat.format,
            now,
        );
        let uptime = (now - self.started_at).to_std().unwrap_or_default();

        format!(
            "Service `{}`: {state}\nHeartbeat: {} (idle {:.1} min, max {:.0})\nTrading: {}\nWatchdog uptime: {}",
            self.settings.service,
            liveness.reason,
            liveness.idle_minutes,
            self.settings.heartbeat.max_idle_minutes,
            if self.trading.enabled() {
                "ENABLED"
            } else {
                "DISABLED"
            },
            format_duration(Duration::from_secs(uptime.as_secs())),
        )
    }

    fn toggle_trading(&mut self, caller: &Caller) -> Result<bool, TradingStateError> {
        let enabled = self.trading.toggle()?;
        self.notify(
            Channel::Main,
            &format!(
                "Trading {} by user {}",
                if enabled { "ENABLED" } else { "DISABLED" },
                caller.user_id
            ),
        );
        Ok(enabled)
    }

    fn manual_restart(&mut self, caller: &Caller, reason: Option<&str>) -> String {
        let reason = match reason {
            Some(reason) => format!("manual restart by user {}: {reason}", caller.user_id),
            None => format!("manual restart by user {}", caller.user_id),
        };
        match self.request_restart(Utc::now(), &reason) {
            RestartDecision::Restarted => format!("`{}` restarted", self.settings.service),
            RestartDecision::Failed(outcome) => outcome.describe(),
            RestartDecision::Denied { recent } => format!(
                "Cooldown active: {recent} restart(s) within {}; restart skipped",
                format_duration(self.settings.cooldown.window)
            ),
        }
    }

    fn panel_report(&mut self) -> String {
        let now = Utc::now();
        let tz = self.settings.timezone;
        let policy = *self.gate.policy();
        let history = self.gate.recent(now);
        let when = |at: DateTime<Utc>| at.with_timezone(&tz).format("%Y-%m-%d %I:%M %p %Z").to_string();

        let mut lines = vec![
            format!("Service: `{}`", self.settings.service),
            format!(
                "Heartbeat: {:?} every {}, max idle {:.0} min",
                self.settings.heartbeat.path,
                format_duration(self.settings.heartbeat.check_interval),
                self.settings.heartbeat.max_idle_minutes
            ),
            format!(
                "Cooldown: {} restart(s) per {}",
                policy.max_restarts,
                format_duration(policy.window)
            ),
            format!(
                "Disk: {:?} threshold {:.0}% every {}",
                self.settings.disk.path,
                self.monitor.threshold_percent(),
                format_duration(self.settings.disk.check_interval)
            ),
            format!("Next heartbeat check: {}", when(self.schedule.heartbeat)),
            format!("Next disk check: {}", when(self.schedule.disk)),
        ];
        if let Some(summary) = self.schedule.summary {
            lines.push(format!("Next daily summary: {}", when(summary)));
        }
        if let Some(tick) = &self.last_heartbeat {
            lines.push(format!(
                "Last check: {} / {} (idle {:.1} min)",
                tick.state, tick.liveness.reason, tick.liveness.idle_minutes
            ));
        }
        lines.push(format!("Restarts in window: {}", history.len()));
        lines.extend(history.iter().map(|RestartEvent { timestamp, reason }| {
            format!("  • {}: {reason}", when(*timestamp))
        }));
        lines.join("\n")
    }

    fn audit(&mut self, caller: &Caller, capability: Capability, result: &str) {
        self.notify(
            Channel::Logs,
            &format!("📝 user {}: {capability} -> {result}", caller.user_id),
        );
    }
}

/// Binds the control socket and starts forwarding its requests to the loop.
pub fn listen(
    socket: &Path,
    events: Sender<LoopEvent>,
) -> Result<thread::JoinHandle<()>, SupervisorError> {
    let listener = ipc::bind(socket)?;
    info!("Control socket listening at {}", socket.display());
    spawn_control_listener(listener, events)
}

/// Spawns the thread that accepts control connections and forwards them to the loop.
///
/// The caller identity is taken from the connecting peer's credentials.
pub fn spawn_control_listener(
    listener: UnixListener,
    events: Sender<LoopEvent>,
) -> Result<thread::JoinHandle<()>, SupervisorError> {
    let handle = thread::Builder::new()
        .name("pulsewatch-control".into())
        .spawn(move || serve_control(listener, events))?;
    Ok(handle)
}

fn serve_control(listener: UnixListener, events: Sender<LoopEvent>) {
    for stream in listener.incoming() {
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Control listener error: {err}");
                continue;
            }
        };

        let caller = match ipc::peer_caller(&stream) {
            Ok(caller) => caller,
            Err(err) => {
                warn!("Could not identify control client: {err}");
                let _ = ipc::write_response(&mut stream, &ControlResponse::Error(err.to_string()));
                continue;
            }
        };

        let request = match ipc::read_request(&mut stream) {
            Ok(request) => request,
            Err(err) => {
                warn!("Invalid control request: {err}");
                let _ = ipc::write_response(&mut stream, &ControlResponse::Error(err.to_string()));
                continue;
            }
        };

        let (reply_tx, reply_rx) = mpsc::channel();
        if events
            .send(LoopEvent::Control {
                caller,
                request,
                reply: reply_tx,
            })
            .is_err()
        {
            let _ = ipc::write_response(
                &mut stream,
                &ControlResponse::Error("watchdog is shutting down".into()),
            );
            break;
        }

        let response = reply_rx
            .recv_timeout(CONTROL_REPLY_TIMEOUT)
            .unwrap_or_else(|_| ControlResponse::Error("watchdog did not respond in time".into()));
        if let Err(err) = ipc::write_response(&mut stream, &response) {
            debug!("Failed to answer control client: {err}");
        }
    }
}

fn next_summary_after(settings: &Settings, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    settings.summary_schedule.as_ref().and_then(|schedule| {
        schedule
            .after(&now.with_timezone(&settings.timezone))
            .next()
            .map(|at| at.with_timezone(&Utc))
    })
}

fn later(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    ChronoDuration::from_std(interval)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Uniform delay in `[0, max)`.
fn startup_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis().min(u64::MAX as u128) as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Compact rendering such as `6h`, `90m` or `45s`.
pub fn format_duration(duration: Duration) -> String {
    match duration.as_secs() {
        secs if secs > 0 && secs % 3600 == 0 => format!("{}h", secs / 3600),
        secs if secs > 0 && secs % 60 == 0 => format!("{}m", secs / 60),
        secs => format!("{secs}s"),
    }
}
