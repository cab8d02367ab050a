//! Operator control commands.
//!
//! A single [`ControlHandler`] serves every entry point (CLI, socket). It checks
//! the caller against an [`Authorizer`] and then dispatches to a
//! [`ControlTarget`], which owns the state the command acts on.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::{info, warn};

use crate::{config::ControlSettings, error::TradingStateError};

/// What a command is allowed to do.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Read-only health summary.
    Status,
    /// Flip the trading flag.
    Toggle,
    /// Restart the monitored service.
    Restart,
    /// Detailed operator view.
    Panel,
}

/// Command carried over the control socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCommand {
    Status,
    Toggle,
    Restart { reason: Option<String> },
    Panel,
}

impl ControlCommand {
    pub fn capability(&self) -> Capability {
        match self {
            ControlCommand::Status => Capability::Status,
            ControlCommand::Toggle => Capability::Toggle,
            ControlCommand::Restart { .. } => Capability::Restart,
            ControlCommand::Panel => Capability::Panel,
        }
    }
}

/// Identity of whoever issued a command, as reported by the kernel for the
/// connecting process: its uid and its primary gid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub user_id: u64,
    pub role_ids: Vec<u64>,
}

/// Decides whether `caller` may use `capability`.
pub trait Authorizer: Send + Sync {
    fn permits(&self, caller: &Caller, capability: Capability) -> bool;
}

/// Status is open to everyone; everything else needs an admin uid or gid.
#[derive(Debug, Clone, Default)]
pub struct AdminAuthorizer {
    admin_ids: Vec<u64>,
    admin_role_ids: Vec<u64>,
}

impl AdminAuthorizer {
    pub fn new(admin_ids: Vec<u64>, admin_role_ids: Vec<u64>) -> Self {
        Self {
            admin_ids,
            admin_role_ids,
        }
    }

    pub fn from_settings(settings: &ControlSettings) -> Self {
        Self::new(settings.admin_ids.clone(), settings.admin_role_ids.clone())
    }

    fn is_admin(&self, caller: &Caller) -> bool {
        self.admin_ids.contains(&caller.user_id)
            || caller
                .role_ids
                .iter()
                .any(|role| self.admin_role_ids.contains(role))
    }
}

impl Authorizer for AdminAuthorizer {
    fn permits(&self, caller: &Caller, capability: Capability) -> bool {
        match capability {
            Capability::Status => true,
            Capability::Toggle | Capability::Restart | Capability::Panel => {
                self.is_admin(caller)
            }
        }
    }
}

/// Response sent back to the issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlResponse {
    Ok,
    Message(String),
    Error(String),
}

/// State a control command acts upon.
pub trait ControlTarget {
    fn status_report(&mut self) -> String;
    fn toggle_trading(&mut self, caller: &Caller) -> Result<bool, TradingStateError>;
    fn manual_restart(&mut self, caller: &Caller, reason: Option<&str>) -> String;
    fn panel_report(&mut self) -> String;
    /// Records the outcome of a command, including denied ones.
    fn audit(&mut self, caller: &Caller, capability: Capability, result: &str);
}

/// Authorizes and dispatches control commands.
pub struct ControlHandler {
    authorizer: Box<dyn Authorizer>,
}

impl ControlHandler {
    pub fn new(authorizer: Box<dyn Authorizer>) -> Self {
        Self { authorizer }
    }

    pub fn handle(
        &self,
        caller: &Caller,
        command: &ControlCommand,
        target: &mut dyn ControlTarget,
    ) -> ControlResponse {
        let capability = command.capability();
        if !self.authorizer.permits(caller, capability) {
            warn!(
                "Denied '{capability}' for user {} (roles {:?})",
                caller.user_id, caller.role_ids
            );
            target.audit(caller, capability, "DENIED");
            return ControlResponse::Error(format!(
                "user {} is not authorized to {capability}",
                caller.user_id
            ));
        }

        info!("User {} invoked '{capability}'", caller.user_id);
        let response = match command {
            ControlCommand::Status => ControlResponse::Message(target.status_report()),
            ControlCommand::Toggle => match target.toggle_trading(caller) {
                Ok(enabled) => ControlResponse::Message(format!(
                    "Trading {}",
                    if enabled { "ENABLED" } else { "DISABLED" }
                )),
                Err(err) => ControlResponse::Error(err.to_string()),
            },
            ControlCommand::Restart { reason } => {
                ControlResponse::Message(target.manual_restart(caller, reason.as_deref()))
            }
            ControlCommand::Panel => ControlResponse::Message(target.panel_report()),
        };

        match &response {
            ControlResponse::Error(err) => target.audit(caller, capability, &format!("ERROR: {err}")),
            _ => target.audit(caller, capability, "OK"),
        }
        response
    }
}

/// Persisted on/off flag for the monitored bot.
///
/// The file holds `true` or `false`. A missing or unreadable file means disabled.
#[derive(Debug, Clone)]
pub struct TradingState {
    path: Option<PathBuf>,
    enabled: bool,
}

impl TradingState {
    /// Loads the flag from `path`; `None` keeps the flag in memory only.
    pub fn load(path: Option<&Path>) -> Self {
        let enabled = match path {
            Some(path) => match fs::read_to_string(path) {
                Ok(content) => content.trim().eq_ignore_ascii_case("true"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => false,
                Err(err) => {
                    warn!("Failed to load trading state from {:?}: {err}", path);
                    false
                }
            },
            None => false,
        };
        Self {
            path: path.map(Path::to_path_buf),
            enabled,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Sets and persists the flag. The in-memory value only changes once the write succeeds.
    pub fn set(&mut self, enabled: bool) -> Result<(), TradingStateError> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, if enabled { "true" } else { "false" })?;
        }
        self.enabled = enabled;
        Ok(())
    }

    pub fn toggle(&mut self) -> Result<bool, TradingStateError> {
        let next = !self.enabled;
        self.set(next)?;
        Ok(next)
    }
}
