//! Error handling for pulsewatch.
use thiserror::Error;

/// Errors that abort the watchdog before its loop starts.
#[derive(Debug, Error)]
pub enum WatchdogError {
    /// Error reading or accessing a configuration file.
    #[error("Failed to read config file: {0}")]
    ConfigReadError(#[from] std::io::Error),

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    ConfigParseError(#[from] serde_yaml::Error),

    /// A configuration value failed validation.
    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfig {
        /// Dotted path of the offending field.
        field: String,
        /// Human-readable description of the problem.
        reason: String,
    },

    /// A `${VAR}` reference in the configuration has no value.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// The HTTP client for notifications could not be built.
    #[error("Failed to build notification client: {0}")]
    NotifierBuildError(#[from] reqwest::Error),
}

impl WatchdogError {
    /// Shorthand for a validation failure on `field`.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        WatchdogError::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error type for disk sampling and cleanup.
#[derive(Debug, Error)]
pub enum DiskError {
    /// No mounted filesystem contains the monitored path.
    #[error("No mounted disk found for path {0}")]
    NoDisk(String),

    /// The filesystem reports zero capacity.
    #[error("Disk at {0} reports zero total capacity")]
    ZeroCapacity(String),

    /// The cleanup action could not be launched or awaited.
    #[error("Cleanup action failed: {0}")]
    CleanupFailed(#[from] std::io::Error),
}

/// Error type for the persisted trading flag.
#[derive(Debug, Error)]
pub enum TradingStateError {
    /// Error writing the state file.
    #[error("Failed to write trading state file: {0}")]
    WriteError(#[from] std::io::Error),
}
