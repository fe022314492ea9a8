//! Scheduled wipe: a fixed-period ticker plus the off-hours full clear of the
//! watch root.
//!
//! The ticker is plain data owned by the daemon loop and polled with
//! [`WipeSchedule::run_pending`]; nothing runs in the background. When the
//! job fires inside the hour window every top-level entry under the root is
//! removed, directories included.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Timelike;

use crate::core::config::Config;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::scanner::deletion::Remover;

// ──────────────────── ticker ────────────────────

/// Fires at most once per period. The first run is one period after creation.
#[derive(Debug, Clone)]
pub struct WipeSchedule {
    period: Duration,
    next_due: Instant,
    last_run: Option<Instant>,
}

impl WipeSchedule {
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next_due: now + period,
            last_run: None,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// Run `job` if due and reschedule one period from `now`. Missed periods
    /// are not replayed.
    pub fn run_pending(&mut self, now: Instant, job: impl FnOnce()) -> bool {
        if !self.is_due(now) {
            return false;
        }
        job();
        self.last_run = Some(now);
        self.next_due = now + self.period;
        true
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn last_run(&self) -> Option<Instant> {
        self.last_run
    }
}

// ──────────────────── hour window ────────────────────

/// Local hours during which the wipe may delete: `[start_hour, 24)` and
/// `[0, quiet_end_hour]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WipeWindow {
    pub start_hour: u32,
    pub quiet_end_hour: u32,
}

impl WipeWindow {
    pub fn contains(self, hour: u32) -> bool {
        hour >= self.start_hour || hour <= self.quiet_end_hour
    }
}

impl Default for WipeWindow {
    fn default() -> Self {
        Self {
            start_hour: 22,
            quiet_end_hour: 6,
        }
    }
}

// ──────────────────── the wipe ────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WipeReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Remove every top-level entry under `root` if `hour` is inside `window`.
///
/// Returns `None` outside the window. Per-entry failures are collected, not
/// raised; an unreadable root yields an empty report.
pub fn wipe_top_level(
    root: &Path,
    hour: u32,
    window: WipeWindow,
    remover: &Remover,
    logger: &ActivityLoggerHandle,
) -> Option<WipeReport> {
    if !window.contains(hour) {
        return None;
    }

    let mut report = WipeReport::default();
    let Ok(entries) = fs::read_dir(root) else {
        return Some(report);
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if remover.remove_entry(&path) {
            logger.send(ActivityEvent::WipeEntryRemoved { path: path.clone() });
            report.removed.push(path);
        } else if fs::symlink_metadata(&path).is_ok() {
            report.failed.push(path);
        }
    }

    logger.send(ActivityEvent::WipeCompleted {
        removed: report.removed.len(),
        failed: report.failed.len(),
    });
    Some(report)
}

/// The ticker bound to a root, a window, and the wall clock.
pub struct ScheduledWipe {
    schedule: WipeSchedule,
    root: PathBuf,
    window: WipeWindow,
    remover: Remover,
    logger: ActivityLoggerHandle,
}

impl ScheduledWipe {
    pub fn new(
        root: impl Into<PathBuf>,
        window: WipeWindow,
        period: Duration,
        remover: Remover,
        logger: ActivityLoggerHandle,
    ) -> Self {
        Self {
            schedule: WipeSchedule::new(period, Instant::now()),
            root: root.into(),
            window,
            remover,
            logger,
        }
    }

    pub fn from_config(config: &Config, remover: Remover, logger: ActivityLoggerHandle) -> Self {
        Self::new(
            config.watch.root.clone(),
            WipeWindow {
                start_hour: config.cleanup.hour,
                quiet_end_hour: config.cleanup.quiet_end_hour,
            },
            config.cleanup.check_interval(),
            remover,
            logger,
        )
    }

    pub fn schedule(&self) -> &WipeSchedule {
        &self.schedule
    }

    /// Check the ticker against the monotonic clock and the local hour.
    pub fn run_pending(&mut self) -> Option<WipeReport> {
        self.run_pending_at(Instant::now(), chrono::Local::now().hour())
    }

    /// Clock-injected form of [`ScheduledWipe::run_pending`]. `None` when the
    /// ticker was not due or the hour was outside the window.
    pub fn run_pending_at(&mut self, now: Instant, hour: u32) -> Option<WipeReport> {
        let mut report = None;
        let (root, window, remover, logger) = (&self.root, self.window, &self.remover, &self.logger);
        self.schedule.run_pending(now, || {
            report = wipe_top_level(root, hour, window, remover, logger);
        });
        if let Some(report) = &report
            && !report.failed.is_empty()
        {
            eprintln!(
                "[DSW-DAEMON] wipe left {} entries under {}",
                report.failed.len(),
                root.display()
            );
        }
        report
    }
}
