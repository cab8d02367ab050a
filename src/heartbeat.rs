//! Heartbeat liveness probe and writer.
//!
//! The monitored process periodically records a timestamp at a well-known path.
//! The watchdog only ever reads that file; a missing, stale or unreadable
//! heartbeat is reported as a liveness failure so the supervisor errs toward
//! restarting rather than silently hanging.
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use strum_macros::{AsRefStr, EnumString};
use tracing::debug;

/// How the heartbeat file encodes the last sign of life.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HeartbeatFormat {
    /// The file contains an ISO-8601 timestamp.
    #[default]
    Timestamp,
    /// The file's modification time is the heartbeat; content is ignored.
    Mtime,
}

/// Why a probe did or did not pass.
#[derive(Debug, Clone, PartialEq)]
pub enum LivenessReason {
    /// Heartbeat is fresh.
    Fresh,
    /// Heartbeat is older than the allowed idle time.
    Stale,
    /// No heartbeat file exists.
    Missing,
    /// The file exists but its timestamp could not be read.
    ParseError(String),
}

impl fmt::Display for LivenessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LivenessReason::Fresh => write!(f, "fresh"),
            LivenessReason::Stale => write!(f, "stale heartbeat"),
            LivenessReason::Missing => write!(f, "missing heartbeat"),
            LivenessReason::ParseError(detail) => write!(f, "parse error: {detail}"),
        }
    }
}

/// Outcome of a single liveness probe.
#[derive(Debug, Clone, PartialEq)]
pub struct LivenessResult {
    pub ok: bool,
    /// Minutes since the last heartbeat; `0.0` when no timestamp was available.
    pub idle_minutes: f64,
    pub reason: LivenessReason,
    /// Timestamp read from the store, when one could be read.
    pub last_beat: Option<DateTime<Utc>>,
}

impl LivenessResult {
    fn failed(reason: LivenessReason) -> Self {
        Self {
            ok: false,
            idle_minutes: 0.0,
            reason,
            last_beat: None,
        }
    }
}

/// Probes `path` against the current wall clock.
pub fn check_liveness(
    path: &Path,
    max_idle_minutes: f64,
    format: HeartbeatFormat,
) -> LivenessResult {
    check_liveness_at(path, max_idle_minutes, format, Utc::now())
}

/// Probes `path` as if the current time were `now`.
pub fn check_liveness_at(
    path: &Path,
    max_idle_minutes: f64,
    format: HeartbeatFormat,
    now: DateTime<Utc>,
) -> LivenessResult {
    let last_beat = match read_heartbeat(path, format) {
        Ok(Some(timestamp)) => timestamp,
        Ok(None) => return LivenessResult::failed(LivenessReason::Missing),
        Err(detail) => return LivenessResult::failed(LivenessReason::ParseError(detail)),
    };

    let idle_minutes = ((now - last_beat).num_milliseconds() as f64 / 60_000.0).max(0.0);
    let ok = idle_minutes <= max_idle_minutes;
    debug!(
        "Heartbeat at {:?} last beat {last_beat}, idle {idle_minutes:.1} min (max {max_idle_minutes})",
        path
    );

    LivenessResult {
        ok,
        idle_minutes,
        reason: if ok {
            LivenessReason::Fresh
        } else {
            LivenessReason::Stale
        },
        last_beat: Some(last_beat),
    }
}

/// Reads the stored heartbeat. `Ok(None)` means the file does not exist.
fn read_heartbeat(
    path: &Path,
    format: HeartbeatFormat,
) -> Result<Option<DateTime<Utc>>, String> {
    match format {
        HeartbeatFormat::Timestamp => match fs::read_to_string(path) {
            Ok(content) => parse_timestamp(&content).map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.to_string()),
        },
        HeartbeatFormat::Mtime => match fs::metadata(path) {
            Ok(metadata) => metadata
                .modified()
                .map(|modified| Some(DateTime::<Utc>::from(modified)))
                .map_err(|err| err.to_string()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.to_string()),
        },
    }
}

/// Parses the first non-empty line as RFC 3339, falling back to a naive
/// timestamp interpreted as UTC.
pub fn parse_timestamp(content: &str) -> Result<DateTime<Utc>, String> {
    let line = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| "heartbeat file is empty".to_string())?;

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(line) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(line, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(line, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("unrecognised timestamp '{line}'"))
}

/// Writes heartbeats on behalf of a monitored process.
#[derive(Debug, Clone)]
pub struct HeartbeatWriter {
    path: PathBuf,
    timezone: Tz,
}

impl HeartbeatWriter {
    pub fn new(path: PathBuf, timezone: Tz) -> Self {
        Self { path, timezone }
    }

    /// Records the current time.
    pub fn beat(&self) -> io::Result<DateTime<Utc>> {
        let now = Utc::now();
        self.beat_at(now)?;
        Ok(now)
    }

    /// Records `at`, replacing the previous heartbeat atomically.
    pub fn beat_at(&self, at: DateTime<Utc>) -> io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "heartbeat".into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let local = at.with_timezone(&self.timezone);
        fs::write(&tmp_path, format!("{}\n", local.to_rfc3339()))?;
        fs::rename(&tmp_path, &self.path)
    }
}
