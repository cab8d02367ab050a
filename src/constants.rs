//! Constants and default values for the pulsewatch supervisor.
//!
//! Everything configurable in `pulsewatch.yaml` takes its default from here so
//! that the documented defaults live in one place.

use std::time::Duration;

// ============================================================================
// Configuration Files
// ============================================================================

/// Configuration file looked up when `--config` is not supplied.
pub const DEFAULT_CONFIG_FILE: &str = "pulsewatch.yaml";

/// Directory under `$HOME` holding runtime artifacts such as the control socket.
pub const RUNTIME_DIR: &str = ".local/share/pulsewatch";

/// File name of the control socket inside [`RUNTIME_DIR`].
pub const SOCKET_FILE_NAME: &str = "control.sock";

// ============================================================================
// Heartbeat Watchdog
// ============================================================================

/// How often the heartbeat is inspected.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// Idle time after which the monitored process is considered hung.
pub const DEFAULT_MAX_IDLE_MINUTES: f64 = 150.0;

/// Interval used by `pulsewatch beat` when writing heartbeats.
pub const DEFAULT_BEAT_INTERVAL: &str = "5m";

// ============================================================================
// Cooldown Gate
// ============================================================================

/// Maximum permitted restarts inside [`DEFAULT_COOLDOWN_WINDOW`].
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

/// Sliding window over which restarts are counted.
pub const DEFAULT_COOLDOWN_WINDOW: Duration = Duration::from_secs(6 * 3600);

// ============================================================================
// Service Control
// ============================================================================

/// Service manager binary used when no explicit commands are configured.
pub const SYSTEMCTL: &str = "systemctl";

/// Upper bound on any single service-manager invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval while waiting on a child process.
pub const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ============================================================================
// Resource Monitor
// ============================================================================

/// Disk usage percentage that triggers the cleanup action.
pub const DEFAULT_DISK_THRESHOLD: f64 = 85.0;

/// Filesystem path whose mount is sampled.
pub const DEFAULT_DISK_PATH: &str = "/";

/// Wait between the cleanup action and the "after" sample.
pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on the cleanup script's runtime.
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(600);

// ============================================================================
// Notifications
// ============================================================================

/// Discord REST API base used by the bot-token notifier.
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Env var holding the bot token unless overridden in the config.
pub const DEFAULT_TOKEN_ENV: &str = "DISCORD_BOT_TOKEN";

/// Timeout for every outbound notification request.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Display name used for webhook posts.
pub const WEBHOOK_USERNAME: &str = "Pulsewatch";

/// Timezone for message timestamps and the daily summary.
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Cron expression (with seconds) for the daily summary: 08:00 every day.
pub const DEFAULT_SUMMARY_SCHEDULE: &str = "0 0 8 * * *";

// ============================================================================
// Control Surface
// ============================================================================

/// How long the IPC acceptor waits for the loop to answer a request.
pub const CONTROL_REPLY_TIMEOUT: Duration = Duration::from_secs(60);
