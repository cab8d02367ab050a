//! Disk usage monitor with threshold-triggered cleanup.
use std::{
    fmt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
    time::Duration,
};

use sysinfo::Disks;
use tracing::{debug, info, warn};

use crate::{
    config::DiskSettings,
    error::DiskError,
    notify::{Channel, Notifier},
    service::run_to_completion,
};

/// Disk usage captured at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskSample {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub percent_used: f64,
}

impl DiskSample {
    pub fn new(used_bytes: u64, total_bytes: u64) -> Self {
        let percent_used = if total_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 * 100.0 / total_bytes as f64
        };
        Self {
            used_bytes,
            total_bytes,
            percent_used,
        }
    }
}

impl fmt::Display for DiskSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({:.0}%)",
            human_bytes(self.used_bytes),
            human_bytes(self.total_bytes),
            self.percent_used
        )
    }
}

/// Formats a byte count with binary units, e.g. `12.3GB`.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1}{}", UNITS[unit])
}

/// Source of disk usage samples.
pub trait DiskProbe: Send + Sync {
    fn sample(&self) -> Result<DiskSample, DiskError>;
}

/// Samples the filesystem containing `path` through `sysinfo`.
#[derive(Debug, Clone)]
pub struct SysinfoDiskProbe {
    path: PathBuf,
}

impl SysinfoDiskProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DiskProbe for SysinfoDiskProbe {
    fn sample(&self) -> Result<DiskSample, DiskError> {
        let target = self
            .path
            .canonicalize()
            .unwrap_or_else(|_| self.path.clone());
        let disks = Disks::new_with_refreshed_list();
        let mounts: Vec<(PathBuf, u64, u64)> = disks
            .list()
            .iter()
            .map(|disk| {
                (
                    disk.mount_point().to_path_buf(),
                    disk.total_space(),
                    disk.available_space(),
                )
            })
            .collect();

        let (mount, total, available) = select_mount(&target, &mounts)
            .ok_or_else(|| DiskError::NoDisk(target.display().to_string()))?;
        if total == 0 {
            return Err(DiskError::ZeroCapacity(mount.display().to_string()));
        }

        Ok(DiskSample::new(total.saturating_sub(available), total))
    }
}

/// Picks the mount with the longest mount point containing `target`.
fn select_mount<'a>(
    target: &Path,
    mounts: &'a [(PathBuf, u64, u64)],
) -> Option<(&'a Path, u64, u64)> {
    mounts
        .iter()
        .filter(|(mount, _, _)| target.starts_with(mount))
        .max_by_key(|(mount, _, _)| mount.components().count())
        .map(|(mount, total, available)| (mount.as_path(), *total, *available))
}

/// Best-effort action that frees disk space.
pub trait CleanupAction: Send + Sync {
    /// Runs the action; the exit code, when there is one, is informational only.
    fn run(&self) -> Result<Option<i32>, DiskError>;
}

/// Runs an external script with no arguments.
#[derive(Debug, Clone)]
pub struct ScriptCleanup {
    script: PathBuf,
    timeout: Duration,
}

impl ScriptCleanup {
    pub fn new(script: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            script: script.into(),
            timeout,
        }
    }
}

impl CleanupAction for ScriptCleanup {
    fn run(&self) -> Result<Option<i32>, DiskError> {
        if !self.script.exists() {
            return Err(DiskError::CleanupFailed(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("cleanup script {} not found", self.script.display()),
            )));
        }

        let child = Command::new(&self.script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let output = run_to_completion(child, self.timeout)?;

        match output.status {
            Some(status) => {
                debug!("Cleanup script exited with {status}");
                Ok(status.code())
            }
            None => Err(DiskError::CleanupFailed(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("cleanup script timed out after {:?}", self.timeout),
            ))),
        }
    }
}

/// Before/after pair around a cleanup run.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanReport {
    pub before: DiskSample,
    pub after: DiskSample,
    /// Never negative: a cleanup that did not help reports zero.
    pub freed_bytes: u64,
    pub freed_percent: f64,
    pub cleanup_error: Option<String>,
}

impl CleanReport {
    pub fn new(before: DiskSample, after: DiskSample, cleanup_error: Option<String>) -> Self {
        Self {
            before,
            after,
            freed_bytes: before.used_bytes.saturating_sub(after.used_bytes),
            freed_percent: (before.percent_used - after.percent_used).max(0.0),
            cleanup_error,
        }
    }
}

/// Samples disk usage and runs the cleanup action once usage reaches the threshold.
pub struct ResourceMonitor {
    probe: Box<dyn DiskProbe>,
    cleanup: Option<Box<dyn CleanupAction>>,
    threshold_percent: f64,
    settle: Duration,
}

impl ResourceMonitor {
    pub fn new(
        probe: Box<dyn DiskProbe>,
        cleanup: Option<Box<dyn CleanupAction>>,
        threshold_percent: f64,
        settle: Duration,
    ) -> Self {
        Self {
            probe,
            cleanup,
            threshold_percent,
            settle,
        }
    }

    /// Builds the monitor described by the configuration.
    pub fn from_settings(settings: &DiskSettings) -> Self {
        let cleanup = settings.cleanup_script.as_ref().map(|script| {
            Box::new(ScriptCleanup::new(script.clone(), settings.cleanup_timeout))
                as Box<dyn CleanupAction>
        });
        Self::new(
            Box::new(SysinfoDiskProbe::new(settings.path.clone())),
            cleanup,
            settings.threshold_percent,
            settings.settle,
        )
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }

    pub fn check_disk(&self) -> Result<DiskSample, DiskError> {
        self.probe.sample()
    }

    /// Cleans when usage is at or above the threshold.
    ///
    /// Returns `Ok(None)` without notifying when usage is below the threshold.
    /// Cleanup failures are reported and the disk is re-sampled regardless.
    pub fn clean_if_needed(
        &self,
        notifier: &dyn Notifier,
    ) -> Result<Option<CleanReport>, DiskError> {
        let before = self.check_disk()?;
        if before.percent_used < self.threshold_percent {
            debug!("Disk usage {before} below threshold {}%", self.threshold_percent);
            return Ok(None);
        }

        info!("Disk usage {before} at or above {}%; cleaning", self.threshold_percent);
        notifier.notify(
            Channel::Logs,
            &format!(
                "🚨 Disk at **{:.0}%** (`{before}`), initiating auto-clean…",
                before.percent_used
            ),
        );

        let cleanup_error = match &self.cleanup {
            Some(cleanup) => match cleanup.run() {
                Ok(code) => {
                    debug!("Cleanup finished with exit code {code:?}");
                    None
                }
                Err(err) => {
                    warn!("{err}");
                    notifier.notify(Channel::Logs, &format!("❌ Auto-clean failed: {err}"));
                    Some(err.to_string())
                }
            },
            None => {
                let message = "no cleanup action configured".to_string();
                notifier.notify(Channel::Logs, &format!("⚠️ Auto-clean skipped: {message}"));
                Some(message)
            }
        };

        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }

        let after = self.check_disk()?;
        let report = CleanReport::new(before, after, cleanup_error);
        notifier.notify(
            Channel::Logs,
            &format!(
                "🧹 **Auto-Clean Complete**\nBefore: `{}`\nAfter: `{}`\nFreed: ~{} ({:.0}%)",
                report.before,
                report.after,
                human_bytes(report.freed_bytes),
                report.freed_percent
            ),
        );
        Ok(Some(report))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::{collections::VecDeque, sync::Mutex};

    /// Replays a fixed sequence of samples, repeating the last one.
    pub struct ScriptedProbe {
        samples: Mutex<VecDeque<Result<DiskSample, String>>>,
    }

    impl ScriptedProbe {
        pub fn new(samples: Vec<Result<DiskSample, String>>) -> Self {
            Self {
                samples: Mutex::new(samples.into()),
            }
        }

        pub fn percents(percents: &[f64]) -> Self {
            Self::new(
                percents
                    .iter()
                    .map(|pct| Ok(DiskSample::new((*pct * 10.0) as u64 * 1024, 1000 * 1024)))
                    .collect(),
            )
        }
    }

    impl DiskProbe for ScriptedProbe {
        fn sample(&self) -> Result<DiskSample, DiskError> {
            let mut samples = self.samples.lock().unwrap();
            let next = if samples.len() > 1 {
                samples.pop_front()
            } else {
                samples.front().cloned()
            };
            match next {
                Some(Ok(sample)) => Ok(sample),
                Some(Err(reason)) => Err(DiskError::NoDisk(reason)),
                None => Err(DiskError::NoDisk("no samples scripted".into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedProbe;
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    struct CountingCleanup {
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    impl CleanupAction for CountingCleanup {
        fn run(&self) -> Result<Option<i32>, DiskError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DiskError::CleanupFailed(std::io::Error::other("boom")))
            } else {
                Ok(Some(0))
            }
        }
    }

    fn monitor(probe: ScriptedProbe, fail: bool) -> (ResourceMonitor, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let cleanup = CountingCleanup {
            runs: Arc::clone(&runs),
            fail,
        };
        (
            ResourceMonitor::new(Box::new(probe), Some(Box::new(cleanup)), 85.0, Duration::ZERO),
            runs,
        )
    }

    #[test]
    fn below_threshold_is_silent() {
        let (monitor, runs) = monitor(ScriptedProbe::percents(&[60.0]), false);
        let notifier = RecordingNotifier::default();

        assert_eq!(monitor.clean_if_needed(&notifier).unwrap(), None);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(notifier.messages().is_empty());
    }

    #[test]
    fn over_threshold_reports_before_and_after() {
        let (monitor, runs) = monitor(ScriptedProbe::percents(&[90.0, 70.0]), false);
        let notifier = RecordingNotifier::default();

        let report = monitor.clean_if_needed(&notifier).unwrap().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!((report.freed_percent - 20.0).abs() < 1e-9);
        assert_eq!(report.freed_bytes, 200 * 1024);
        assert!(report.cleanup_error.is_none());

        let messages = notifier.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].1.contains("Disk at **90%**"));
        assert!(messages[1].1.contains("Auto-Clean Complete"));
        assert!(messages.iter().all(|(channel, _)| *channel == Channel::Logs));
    }

    #[test]
    fn worse_usage_after_cleanup_reports_zero_freed() {
        let (monitor, _) = monitor(ScriptedProbe::percents(&[85.0, 90.0]), false);
        let notifier = RecordingNotifier::default();

        let report = monitor.clean_if_needed(&notifier).unwrap().unwrap();
        assert_eq!(report.freed_bytes, 0);
        assert_eq!(report.freed_percent, 0.0);
        assert!(notifier.contains("Freed: ~0.0B (0%)"));
    }

    #[test]
    fn clean_report_clamps_to_zero() {
        let report = CleanReport::new(DiskSample::new(80, 100), DiskSample::new(85, 100), None);
        assert_eq!(report.freed_bytes, 0);
        assert_eq!(report.freed_percent, 0.0);
    }

    #[test]
    fn cleanup_failure_is_reported_and_disk_resampled() {
        let (monitor, runs) = monitor(ScriptedProbe::percents(&[95.0, 94.0]), true);
        let notifier = RecordingNotifier::default();

        let report = monitor.clean_if_needed(&notifier).unwrap().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(report.after.percent_used, 94.0);
        assert!(report.cleanup_error.unwrap().contains("boom"));
        assert!(notifier.contains("Auto-clean failed"));
        assert!(notifier.contains("Auto-Clean Complete"));
    }

    #[test]
    fn sampling_failure_propagates() {
        let probe = ScriptedProbe::new(vec![Err("no such mount".into())]);
        let (monitor, runs) = monitor(probe, false);
        let notifier = RecordingNotifier::default();

        assert!(monitor.clean_if_needed(&notifier).is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn script_cleanup_runs_executable_and_reports_missing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("cleaned");
        let script = dir.path().join("cleanup.sh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\ntouch {}\nexit 3\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cleanup = ScriptCleanup::new(&script, Duration::from_secs(5));
        assert_eq!(cleanup.run().unwrap(), Some(3));
        assert!(marker.exists());

        let missing = ScriptCleanup::new(dir.path().join("absent.sh"), Duration::from_secs(5));
        assert!(missing.run().is_err());
    }

    #[test]
    fn selects_most_specific_mount() {
        let mounts = vec![
            (PathBuf::from("/"), 100, 50),
            (PathBuf::from("/var"), 200, 20),
            (PathBuf::from("/var/lib/docker"), 300, 30),
        ];
        let (mount, total, _) = select_mount(Path::new("/var/log/app"), &mounts).unwrap();
        assert_eq!(mount, Path::new("/var"));
        assert_eq!(total, 200);

        let (mount, _, _) = select_mount(Path::new("/home/bot"), &mounts).unwrap();
        assert_eq!(mount, Path::new("/"));

        assert!(select_mount(Path::new("relative"), &mounts).is_none());
    }

    #[test]
    fn human_bytes_uses_binary_units() {
        assert_eq!(human_bytes(512), "512.0B");
        assert_eq!(human_bytes(1536), "1.5KB");
        assert_eq!(human_bytes(5 * 1024 * 1024 * 1024), "5.0GB");
    }
}
