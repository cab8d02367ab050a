//! Command-line interface for Pulsewatch.
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::constants::{DEFAULT_BEAT_INTERVAL, DEFAULT_CONFIG_FILE};

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };

            return Ok(LogLevelArg(level));
        }

        let level = match trimmed.to_ascii_lowercase().as_str() {
            "off" => Some(LevelFilter::OFF),
            "error" | "err" => Some(LevelFilter::ERROR),
            "warn" | "warning" => Some(LevelFilter::WARN),
            "info" | "information" => Some(LevelFilter::INFO),
            "debug" => Some(LevelFilter::DEBUG),
            "trace" => Some(LevelFilter::TRACE),
            _ => None,
        }
        .ok_or_else(|| format!("invalid log level '{trimmed}'"))?;

        Ok(LogLevelArg(level))
    }
}

/// Command-line interface for Pulsewatch.
#[derive(Parser)]
#[command(name = "pulsewatch", version, author)]
#[command(about = "Heartbeat watchdog with restart cooldown and disk auto-clean", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by commands that talk to a running watchdog.
#[derive(Args, Debug, Clone)]
pub struct ControlArgs {
    /// Path to the configuration file, used to locate the control socket.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Control socket to connect to, bypassing the configuration file.
    #[arg(long, value_name = "PATH")]
    pub socket: Option<String>,
}

/// Available commands for pulsewatch.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the watchdog in the foreground until interrupted.
    Run {
        /// Path to the configuration file (defaults to `pulsewatch.yaml`).
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: String,
    },

    /// Run a single heartbeat check and disk check, then exit.
    Check {
        /// Path to the configuration file (defaults to `pulsewatch.yaml`).
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: String,
    },

    /// Show the health of the monitored service.
    Status(ControlArgs),

    /// Flip the trading flag.
    Toggle(ControlArgs),

    /// Restart the monitored service through the cooldown gate.
    Restart {
        #[command(flatten)]
        control: ControlArgs,

        /// Reason recorded with the restart.
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Show thresholds, restart history and upcoming checks.
    Panel(ControlArgs),

    /// Write heartbeats on behalf of a process that does not write its own.
    Beat {
        /// Heartbeat file to write.
        #[arg(short, long)]
        path: String,

        /// Interval between beats (e.g., "300", "30s", "5m").
        #[arg(short, long, default_value = DEFAULT_BEAT_INTERVAL)]
        interval: String,

        /// Write a single beat and exit.
        #[arg(long)]
        once: bool,

        /// IANA timezone for the written timestamp.
        #[arg(long, default_value = "UTC")]
        timezone: String,
    },
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
