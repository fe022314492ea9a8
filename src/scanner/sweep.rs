//! Scan-and-sweep engine and the stall recovery loop built on it.
//!
//! A sweep visits every file in a snapshot exactly once, with no early exit,
//! and reports whether the pass left anything unresolved. Recovery repeats
//! sweeps at the poll interval until one comes back clean.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::core::config::{Config, ExcludeSet};
use crate::core::errors::Result;
use crate::core::paths::extension_key;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::scanner::classifier::{Classifier, Verdict};
use crate::scanner::deletion::{DeletionConfig, Remover};
use crate::scanner::probe::ContainerKind;
use crate::scanner::walker::{self, DirectorySnapshot};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub verdict: Verdict,
}

/// Result of one pass.
#[derive(Debug, Clone)]
pub struct SweepReport {
    /// The root as it looked after the pass.
    pub snapshot: DirectorySnapshot,
    /// True only if every file in the pass resolved.
    pub all_resolved: bool,
    pub outcomes: Vec<FileOutcome>,
    pub duration: Duration,
}

impl SweepReport {
    pub fn unresolved(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.verdict.is_resolved())
    }

    pub fn unresolved_count(&self) -> usize {
        self.unresolved().count()
    }

    pub fn verdict_for(&self, path: &Path) -> Option<Verdict> {
        self.outcomes
            .iter()
            .find(|o| o.path == path)
            .map(|o| o.verdict)
    }

    /// Number of outcomes with the given verdict label (`"deleted"`, ...).
    pub fn count(&self, label: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.verdict.label() == label)
            .count()
    }
}

/// How a bounded recovery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// A pass resolved every file; the post-pass snapshot.
    Converged(DirectorySnapshot),
    /// The pass budget ran out with files still unresolved.
    Exhausted {
        passes: u32,
        snapshot: DirectorySnapshot,
    },
}

impl RecoveryOutcome {
    pub fn snapshot(&self) -> &DirectorySnapshot {
        match self {
            Self::Converged(snapshot) | Self::Exhausted { snapshot, .. } => snapshot,
        }
    }

    pub fn into_snapshot(self) -> DirectorySnapshot {
        match self {
            Self::Converged(snapshot) | Self::Exhausted { snapshot, .. } => snapshot,
        }
    }
}

pub struct SweepEngine {
    root: PathBuf,
    exclude: ExcludeSet,
    classifier: Classifier,
    interval: Duration,
    logger: ActivityLoggerHandle,
}

impl SweepEngine {
    pub fn new(root: impl Into<PathBuf>, exclude: ExcludeSet, classifier: Classifier) -> Self {
        Self {
            root: root.into(),
            exclude,
            classifier,
            interval: DEFAULT_INTERVAL,
            logger: ActivityLoggerHandle::disabled(),
        }
    }

    /// Engine wired from the `[watch]` section.
    pub fn from_config(config: &Config) -> Self {
        let remover = Remover::new(DeletionConfig {
            check_open_files: config.watch.check_open_files,
        });
        Self::new(
            config.watch.root.clone(),
            config.watch.exclude_set(),
            Classifier::new(remover),
        )
        .with_interval(config.watch.poll_interval())
    }

    /// Pause between recovery passes.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.logger = logger;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn logger(&self) -> &ActivityLoggerHandle {
        &self.logger
    }

    pub fn remover(&self) -> &Remover {
        self.classifier.remover()
    }

    /// Enumerate the root.
    pub fn snapshot(&self) -> Result<DirectorySnapshot> {
        walker::enumerate(&self.root)
    }

    /// Process every file in `files`, then re-enumerate the root.
    pub fn sweep(&self, files: &DirectorySnapshot) -> Result<SweepReport> {
        let started = Instant::now();
        let outcomes: Vec<FileOutcome> = files
            .iter()
            .map(|path| FileOutcome {
                path: path.clone(),
                verdict: self.process_file(path),
            })
            .collect();
        let all_resolved = outcomes.iter().all(|o| o.verdict.is_resolved());
        let snapshot = self.snapshot()?;
        let duration = started.elapsed();

        let unresolved = outcomes.iter().filter(|o| !o.verdict.is_resolved()).count();
        self.logger.send(ActivityEvent::SweepCompleted {
            files: outcomes.len(),
            unresolved,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        });

        Ok(SweepReport {
            snapshot,
            all_resolved,
            outcomes,
            duration,
        })
    }

    /// Decide and act on one file.
    pub fn process_file(&self, path: &Path) -> Verdict {
        let ext = extension_key(path);
        self.logger.send(ActivityEvent::FileInspected {
            path: path.to_path_buf(),
        });

        let verdict = if self.exclude.contains(&ext) {
            Verdict::Skipped
        } else {
            match ContainerKind::from_extension(&ext) {
                Some(kind) => self.classifier.classify(path, kind),
                None => self.classifier.delete(path),
            }
        };

        if let Some(event) = ActivityEvent::for_verdict(path, verdict) {
            self.logger.send(event);
        }
        verdict
    }

    /// Sweep until a pass resolves every file. Never gives up.
    pub fn recover(&self) -> Result<DirectorySnapshot> {
        self.recover_with(None, &mut || {})
            .map(RecoveryOutcome::into_snapshot)
    }

    /// [`SweepEngine::recover`] with a pass budget.
    pub fn recover_bounded(&self, max_passes: u32) -> Result<RecoveryOutcome> {
        self.recover_with(Some(max_passes), &mut || {})
    }

    /// The recovery loop. Each pass: enumerate, sweep, sleep, then
    /// `between_passes` (the daemon runs its pending wipe there).
    pub fn recover_with(
        &self,
        max_passes: Option<u32>,
        between_passes: &mut dyn FnMut(),
    ) -> Result<RecoveryOutcome> {
        let mut passes = 0u32;
        loop {
            if max_passes.is_some_and(|max| passes >= max) {
                return Ok(RecoveryOutcome::Exhausted {
                    passes,
                    snapshot: self.snapshot()?,
                });
            }
            passes = passes.saturating_add(1);

            let files = self.snapshot()?;
            let report = self.sweep(&files)?;
            if !report.all_resolved {
                self.logger.send(ActivityEvent::StallRecovery {
                    pass: passes,
                    unresolved: report.unresolved_count(),
                });
            }

            thread::sleep(self.interval);
            between_passes();

            if report.all_resolved {
                return Ok(RecoveryOutcome::Converged(report.snapshot));
            }
        }
    }
}
