//! Configuration management for pulsewatch.
//!
//! The YAML file is parsed into [`Config`], which mirrors the file layout with
//! optional fields, and then validated once into [`Settings`]. Components only
//! ever see `Settings`.
use chrono_tz::Tz;
use cron::Schedule;
use regex::Regex;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::{
    constants::{
        DEFAULT_CHECK_INTERVAL, DEFAULT_CLEANUP_TIMEOUT, DEFAULT_COMMAND_TIMEOUT,
        DEFAULT_CONFIG_FILE, DEFAULT_COOLDOWN_WINDOW, DEFAULT_DISK_PATH,
        DEFAULT_DISK_THRESHOLD, DEFAULT_MAX_IDLE_MINUTES, DEFAULT_MAX_RESTARTS,
        DEFAULT_NOTIFY_TIMEOUT, DEFAULT_SETTLE_INTERVAL, DEFAULT_SUMMARY_SCHEDULE,
        DEFAULT_TIMEZONE, DEFAULT_TOKEN_ENV, RUNTIME_DIR, SOCKET_FILE_NAME, SYSTEMCTL,
    },
    cooldown::CooldownPolicy,
    error::WatchdogError,
    heartbeat::HeartbeatFormat,
};

/// Represents the structure of the configuration file.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Configuration version.
    pub version: Option<String>,
    /// Unit name handed to the service manager (e.g. `echopropulse.service`).
    pub service: String,
    /// Heartbeat watchdog settings.
    pub heartbeat: HeartbeatConfig,
    /// Restart cooldown gate.
    #[serde(default)]
    pub cooldown: CooldownConfig,
    /// Disk monitor and auto-clean.
    #[serde(default)]
    pub disk: DiskConfig,
    /// Daily "all systems green" report.
    #[serde(default)]
    pub summary: SummaryConfig,
    /// Notification backends.
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Control socket and authorization.
    #[serde(default)]
    pub control: ControlConfig,
    /// Overrides for the service-manager commands.
    #[serde(default)]
    pub service_control: ServiceControlConfig,
    /// Optional dotenv-style file loaded before `${VAR}` expansion.
    pub env_file: Option<String>,
    /// IANA timezone used for message timestamps and the summary schedule.
    pub timezone: Option<String>,
    /// Upper bound of the random delay before the first tick.
    pub startup_jitter: Option<String>,
    /// Root directory from which relative paths are resolved.
    #[serde(skip)]
    pub project_dir: Option<String>,
}

/// `heartbeat:` section.
#[derive(Debug, Deserialize, Clone)]
pub struct HeartbeatConfig {
    pub path: String,
    #[serde(default)]
    pub format: HeartbeatFormat,
    /// Maximum idle time, e.g. `150m`.
    pub max_idle: Option<String>,
    pub check_interval: Option<String>,
}

/// `cooldown:` section.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CooldownConfig {
    pub max_restarts: Option<u32>,
    pub window: Option<String>,
}

/// `disk:` section.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DiskConfig {
    pub path: Option<String>,
    pub threshold_percent: Option<f64>,
    pub check_interval: Option<String>,
    pub cleanup_script: Option<String>,
    pub settle: Option<String>,
    pub cleanup_timeout: Option<String>,
}

/// `summary:` section.
#[derive(Debug, Deserialize, Clone)]
pub struct SummaryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Six-field cron expression evaluated in the configured timezone.
    pub schedule: Option<String>,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// `notify:` section.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotifyConfig {
    pub discord: Option<DiscordConfig>,
    pub webhook_url: Option<String>,
    pub timeout: Option<String>,
}

/// `notify.discord:` section.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DiscordConfig {
    /// Name of the env var holding the bot token.
    pub token_env: Option<String>,
    #[serde(default)]
    pub channels: ChannelIds,
}

/// Discord channel ids per logical channel.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ChannelIds {
    pub main: Option<String>,
    pub logs: Option<String>,
    pub ops: Option<String>,
}

/// `control:` section.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ControlConfig {
    pub socket: Option<String>,
    pub state_file: Option<String>,
    #[serde(default)]
    pub admin_ids: Vec<u64>,
    #[serde(default)]
    pub admin_role_ids: Vec<u64>,
}

/// `service_control:` section.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServiceControlConfig {
    pub restart_command: Option<Vec<String>>,
    pub state_command: Option<Vec<String>>,
    pub timeout: Option<String>,
}

/// Validated heartbeat settings.
#[derive(Debug, Clone)]
pub struct HeartbeatSettings {
    pub path: PathBuf,
    pub format: HeartbeatFormat,
    pub max_idle_minutes: f64,
    pub check_interval: Duration,
}

/// Validated disk monitor settings.
#[derive(Debug, Clone)]
pub struct DiskSettings {
    pub path: PathBuf,
    pub threshold_percent: f64,
    pub check_interval: Duration,
    pub cleanup_script: Option<PathBuf>,
    pub settle: Duration,
    pub cleanup_timeout: Duration,
}

/// Validated notifier settings.
#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub discord: Option<DiscordSettings>,
    pub webhook_url: Option<String>,
    pub timeout: Duration,
}

/// Bot token and channel ids for the Discord REST notifier.
#[derive(Clone)]
pub struct DiscordSettings {
    pub token: String,
    pub channels: ChannelIds,
}

impl std::fmt::Debug for DiscordSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordSettings")
            .field("token", &"<redacted>")
            .field("channels", &self.channels)
            .finish()
    }
}

/// Validated control surface settings.
#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub socket: PathBuf,
    pub state_file: Option<PathBuf>,
    pub admin_ids: Vec<u64>,
    pub admin_role_ids: Vec<u64>,
}

/// Validated service-manager commands. The unit name is appended as the last argument.
#[derive(Debug, Clone)]
pub struct ServiceControlSettings {
    pub restart_command: Vec<String>,
    pub state_command: Vec<String>,
    pub timeout: Duration,
}

/// Fully validated configuration injected into every component.
#[derive(Debug, Clone)]
pub struct Settings {
    pub service: String,
    pub heartbeat: HeartbeatSettings,
    pub cooldown: CooldownPolicy,
    pub disk: DiskSettings,
    /// `None` when the daily summary is disabled.
    pub summary_schedule: Option<Schedule>,
    pub timezone: Tz,
    pub notify: NotifySettings,
    pub control: ControlSettings,
    pub service_control: ServiceControlSettings,
    pub startup_jitter: Duration,
}

impl Config {
    /// Resolves `raw` relative to the configuration directory.
    fn resolve_path(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        let base = self.project_dir.as_deref().unwrap_or(".");
        Path::new(base).join(path)
    }

    /// Validates the raw file contents into [`Settings`].
    pub fn into_settings(self) -> Result<Settings, WatchdogError> {
        let service = self.service.trim().to_string();
        if service.is_empty() {
            return Err(WatchdogError::invalid("service", "must not be empty"));
        }

        let heartbeat = self.heartbeat_settings()?;
        let cooldown = self.cooldown_policy()?;
        let disk = self.disk_settings()?;

        let timezone_name = self.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
        let timezone = Tz::from_str(timezone_name).map_err(|err| {
            WatchdogError::invalid("timezone", format!("{timezone_name}: {err}"))
        })?;

        let summary_schedule = if self.summary.enabled {
            let expression = self
                .summary
                .schedule
                .as_deref()
                .unwrap_or(DEFAULT_SUMMARY_SCHEDULE);
            Some(Schedule::from_str(expression).map_err(|err| {
                WatchdogError::invalid(
                    "summary.schedule",
                    format!("invalid cron expression '{expression}': {err}"),
                )
            })?)
        } else {
            None
        };

        let notify = self.notify_settings()?;
        let control = self.control_settings()?;
        let service_control = self.service_control_settings()?;
        let startup_jitter = optional_duration(
            "startup_jitter",
            self.startup_jitter.as_deref(),
            Duration::ZERO,
        )?;

        Ok(Settings {
            service,
            heartbeat,
            cooldown,
            disk,
            summary_schedule,
            timezone,
            notify,
            control,
            service_control,
            startup_jitter,
        })
    }

    fn heartbeat_settings(&self) -> Result<HeartbeatSettings, WatchdogError> {
        let max_idle_minutes = match self.heartbeat.max_idle.as_deref() {
            Some(raw) => parse_duration(raw)
                .map_err(|reason| WatchdogError::invalid("heartbeat.max_idle", reason))?
                .as_secs_f64()
                / 60.0,
            None => DEFAULT_MAX_IDLE_MINUTES,
        };
        if max_idle_minutes <= 0.0 {
            return Err(WatchdogError::invalid(
                "heartbeat.max_idle",
                "must be greater than zero",
            ));
        }

        Ok(HeartbeatSettings {
            path: self.resolve_path(&self.heartbeat.path),
            format: self.heartbeat.format,
            max_idle_minutes,
            check_interval: positive_duration(
                "heartbeat.check_interval",
                self.heartbeat.check_interval.as_deref(),
                DEFAULT_CHECK_INTERVAL,
            )?,
        })
    }

    fn cooldown_policy(&self) -> Result<CooldownPolicy, WatchdogError> {
        Ok(CooldownPolicy {
            max_restarts: self.cooldown.max_restarts.unwrap_or(DEFAULT_MAX_RESTARTS),
            window: positive_duration(
                "cooldown.window",
                self.cooldown.window.as_deref(),
                DEFAULT_COOLDOWN_WINDOW,
            )?,
        })
    }

    fn disk_settings(&self) -> Result<DiskSettings, WatchdogError> {
        let threshold_percent = self
            .disk
            .threshold_percent
            .unwrap_or(DEFAULT_DISK_THRESHOLD);
        if !(threshold_percent > 0.0 && threshold_percent <= 100.0) {
            return Err(WatchdogError::invalid(
                "disk.threshold_percent",
                format!("{threshold_percent} is outside (0, 100]"),
            ));
        }

        Ok(DiskSettings {
            path: PathBuf::from(self.disk.path.as_deref().unwrap_or(DEFAULT_DISK_PATH)),
            threshold_percent,
            check_interval: positive_duration(
                "disk.check_interval",
                self.disk.check_interval.as_deref(),
                DEFAULT_CHECK_INTERVAL,
            )?,
            cleanup_script: self
                .disk
                .cleanup_script
                .as_deref()
                .map(|raw| self.resolve_path(raw)),
            settle: optional_duration(
                "disk.settle",
                self.disk.settle.as_deref(),
                DEFAULT_SETTLE_INTERVAL,
            )?,
            cleanup_timeout: positive_duration(
                "disk.cleanup_timeout",
                self.disk.cleanup_timeout.as_deref(),
                DEFAULT_CLEANUP_TIMEOUT,
            )?,
        })
    }

    fn notify_settings(&self) -> Result<NotifySettings, WatchdogError> {
        let discord = match &self.notify.discord {
            Some(discord) => {
                let token_env = discord.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV);
                let token = env::var(token_env)
                    .ok()
                    .filter(|token| !token.trim().is_empty())
                    .ok_or_else(|| {
                        WatchdogError::invalid(
                            "notify.discord.token_env",
                            format!("environment variable {token_env} is not set"),
                        )
                    })?;
                Some(DiscordSettings {
                    token,
                    channels: discord.channels.clone(),
                })
            }
            None => None,
        };

        let webhook_url = self
            .notify
            .webhook_url
            .as_ref()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        Ok(NotifySettings {
            discord,
            webhook_url,
            timeout: positive_duration(
                "notify.timeout",
                self.notify.timeout.as_deref(),
                DEFAULT_NOTIFY_TIMEOUT,
            )?,
        })
    }

    fn control_settings(&self) -> Result<ControlSettings, WatchdogError> {
        let socket = match self.control.socket.as_deref() {
            Some(raw) => self.resolve_path(raw),
            None => default_socket_path()?,
        };

        Ok(ControlSettings {
            socket,
            state_file: self
                .control
                .state_file
                .as_deref()
                .map(|raw| self.resolve_path(raw)),
            admin_ids: self.control.admin_ids.clone(),
            admin_role_ids: self.control.admin_role_ids.clone(),
        })
    }

    fn service_control_settings(&self) -> Result<ServiceControlSettings, WatchdogError> {
        let restart_command = self
            .service_control
            .restart_command
            .clone()
            .unwrap_or_else(|| vec![SYSTEMCTL.into(), "restart".into()]);
        let state_command = self
            .service_control
            .state_command
            .clone()
            .unwrap_or_else(|| vec![SYSTEMCTL.into(), "is-active".into()]);

        if restart_command.is_empty() {
            return Err(WatchdogError::invalid(
                "service_control.restart_command",
                "must name a program",
            ));
        }
        if state_command.is_empty() {
            return Err(WatchdogError::invalid(
                "service_control.state_command",
                "must name a program",
            ));
        }

        Ok(ServiceControlSettings {
            restart_command,
            state_command,
            timeout: positive_duration(
                "service_control.timeout",
                self.service_control.timeout.as_deref(),
                DEFAULT_COMMAND_TIMEOUT,
            )?,
        })
    }
}

/// Default control socket under `$HOME`.
pub fn default_socket_path() -> Result<PathBuf, WatchdogError> {
    let home = env::var_os("HOME")
        .ok_or_else(|| WatchdogError::invalid("control.socket", "HOME is not set"))?;
    Ok(PathBuf::from(home).join(RUNTIME_DIR).join(SOCKET_FILE_NAME))
}

/// Parses a user-facing duration string in the format `<number>[s|m|h]`.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("Duration value cannot be empty".into());
    }

    let (amount_str, multiplier) = if let Some(stripped) = value.strip_suffix('s') {
        (stripped.trim(), 1)
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped.trim(), 60)
    } else if let Some(stripped) = value.strip_suffix('h') {
        (stripped.trim(), 3600)
    } else {
        (value, 1)
    };

    let amount: u64 = amount_str
        .parse()
        .map_err(|_| format!("Invalid duration value: '{raw}'"))?;

    Ok(Duration::from_secs(amount.saturating_mul(multiplier)))
}

fn optional_duration(
    field: &str,
    raw: Option<&str>,
    default: Duration,
) -> Result<Duration, WatchdogError> {
    match raw {
        Some(raw) => parse_duration(raw).map_err(|reason| WatchdogError::invalid(field, reason)),
        None => Ok(default),
    }
}

fn positive_duration(
    field: &str,
    raw: Option<&str>,
    default: Duration,
) -> Result<Duration, WatchdogError> {
    let duration = optional_duration(field, raw, default)?;
    if duration.is_zero() {
        return Err(WatchdogError::invalid(field, "must be greater than zero"));
    }
    Ok(duration)
}

/// Expands `$VAR`, `${VAR}` and `${VAR:-default}` references within a string.
///
/// Whole-line YAML comments are copied through untouched.
fn expand_env_vars(input: &str) -> Result<String, WatchdogError> {
    let re = Regex::new(
        r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}|\$([A-Za-z_][A-Za-z0-9_]*)",
    )
    .map_err(|err| WatchdogError::invalid("env expansion", err.to_string()))?;

    let mut expanded = String::with_capacity(input.len());
    for line in input.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            expanded.push_str(line);
        } else {
            expanded.push_str(&expand_line(&re, line)?);
        }
    }
    Ok(expanded)
}

fn expand_line(re: &Regex, line: &str) -> Result<String, WatchdogError> {
    let mut missing = None;
    let result = re.replace_all(line, |caps: &regex::Captures| {
        let var_name = caps
            .get(1)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        match (env::var(var_name), caps.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var_name) => Err(WatchdogError::MissingEnvVar(var_name)),
        None => Ok(result.to_string()),
    }
}

/// Loads a `.env` file and sets environment variables that are not already set.
fn load_env_file(path: &Path) -> Result<(), WatchdogError> {
    let content = fs::read_to_string(path).map_err(WatchdogError::ConfigReadError)?;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let mut value = value.trim();

            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            if env::var_os(key).is_none() {
                unsafe {
                    env::set_var(key, value);
                }
            }
        }
    }
    Ok(())
}

/// Loads, expands and validates the configuration file.
pub fn load_config(config_path: Option<&str>) -> Result<Settings, WatchdogError> {
    let config_path = Path::new(config_path.unwrap_or(DEFAULT_CONFIG_FILE));

    let content = fs::read_to_string(config_path).map_err(|e| {
        WatchdogError::ConfigReadError(std::io::Error::new(
            e.kind(),
            format!("{} ({})", e, config_path.display()),
        ))
    })?;

    let base_path = config_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    // The env file must be loaded before expansion, so it is read from the raw
    // document without requiring the rest of it to parse.
    let raw: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(WatchdogError::ConfigParseError)?;
    if let Some(env_file) = raw.get("env_file").and_then(|value| value.as_str()) {
        let path = Path::new(env_file);
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_path.join(path)
        };
        load_env_file(&resolved)?;
    }

    let expanded_content = expand_env_vars(&content)?;
    let mut config: Config =
        serde_yaml::from_str(&expanded_content).map_err(WatchdogError::ConfigParseError)?;
    config.project_dir = Some(base_path.to_string_lossy().to_string());

    config.into_settings()
}
