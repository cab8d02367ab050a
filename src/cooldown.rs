//! Restart cooldown gate.
//!
//! Restarts are counted over a sliding window measured back from the instant of
//! each decision. Events older than the window are pruned one at a time as they
//! age out, so a crash loop is throttled without the burst-at-boundary effect of
//! fixed buckets.
use std::{sync::Mutex, time::Duration};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, warn};

/// Limits how many restarts may happen within a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    /// `0` disables automatic and manual restarts entirely.
    pub max_restarts: u32,
    pub window: Duration,
}

impl CooldownPolicy {
    fn window_chrono(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.window).unwrap_or(ChronoDuration::MAX)
    }
}

/// A restart that was admitted by the gate and carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartEvent {
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Result of a single admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub permitted: bool,
    /// History with expired events removed. Callers keep this regardless of `permitted`.
    pub history: Vec<RestartEvent>,
}

/// Decides whether a restart may happen at `now`.
pub fn admit_restart(
    history: &[RestartEvent],
    policy: &CooldownPolicy,
    now: DateTime<Utc>,
) -> Admission {
    let window = policy.window_chrono();
    let history: Vec<RestartEvent> = history
        .iter()
        .filter(|event| now.signed_duration_since(event.timestamp) < window)
        .cloned()
        .collect();

    Admission {
        permitted: history.len() < policy.max_restarts as usize,
        history,
    }
}

/// Outcome of routing a restart through the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision<T> {
    /// The cooldown is active; nothing was attempted.
    Denied {
        /// Number of restarts still inside the window.
        recent: usize,
    },
    /// The restart callback ran and returned `T`.
    Attempted(T),
}

/// Owns the restart history and serialises every admission decision.
#[derive(Debug)]
pub struct RestartGate {
    policy: CooldownPolicy,
    history: Mutex<Vec<RestartEvent>>,
}

impl RestartGate {
    pub fn new(policy: CooldownPolicy) -> Self {
        Self {
            policy,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> &CooldownPolicy {
        &self.policy
    }

    /// Runs `restart` if the gate admits it at `now`.
    ///
    /// The history lock is held from pruning through the append, so two callers
    /// can never both take the last free slot. `restart` returns whether the
    /// restart succeeded; only successful restarts are recorded.
    pub fn attempt<T>(
        &self,
        now: DateTime<Utc>,
        reason: &str,
        restart: impl FnOnce() -> (bool, T),
    ) -> GateDecision<T> {
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let admission = admit_restart(&history, &self.policy, now);
        *history = admission.history;

        if !admission.permitted {
            warn!(
                "Cooldown active: {} restart(s) within {:?}; skipping restart ({reason})",
                history.len(),
                self.policy.window
            );
            return GateDecision::Denied {
                recent: history.len(),
            };
        }

        let (succeeded, outcome) = restart();
        if succeeded {
            history.push(RestartEvent {
                timestamp: now,
                reason: reason.to_string(),
            });
            debug!("Recorded restart #{} in window: {reason}", history.len());
        }

        GateDecision::Attempted(outcome)
    }

    /// Events still inside the window at `now`.
    pub fn recent(&self, now: DateTime<Utc>) -> Vec<RestartEvent> {
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let admission = admit_restart(&history, &self.policy, now);
        *history = admission.history.clone();
        admission.history
    }
}
