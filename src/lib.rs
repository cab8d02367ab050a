//! Pulsewatch is a heartbeat watchdog for a single long-running service. It restarts
//! the service when its heartbeat goes stale or its unit leaves the running state,
//! bounds those restarts with a sliding-window cooldown, keeps the disk below a usage
//! threshold, and reports everything it does to an operator channel.

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Shared defaults.
pub mod constants;

/// Operator commands and authorization.
pub mod control;

/// Restart rate limiting.
pub mod cooldown;

/// Disk usage monitoring and cleanup.
pub mod disk;

/// Error handling.
pub mod error;

/// Heartbeat reading and writing.
pub mod heartbeat;

/// IPC helpers for communicating with the resident watchdog.
pub mod ipc;

/// Operator notifications.
pub mod notify;

/// Service manager integration.
pub mod service;

/// Supervisor runtime that drives the periodic checks.
pub mod supervisor;
