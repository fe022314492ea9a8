//! Main watch loop: wait for the root, then poll and sweep on change.
//!
//! Single thread, blocking sleeps. Each iteration runs the pending wipe (when
//! cleanup is enabled), snapshots the root, and compares it with the snapshot
//! adopted last time. Only a changed snapshot triggers a sweep; a sweep that
//! leaves files unresolved hands over to stall recovery, which keeps
//! re-sweeping until the directory settles.
//!
//! A root that disappears sends the loop back to waiting. Every other error
//! ends [`WatchDaemon::run`] and is returned to the caller for the journal.

#![allow(missing_docs)]

use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::core::config::Config;
use crate::core::errors::{DswError, Result};
use crate::daemon::schedule::ScheduledWipe;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::scanner::sweep::{RecoveryOutcome, SweepEngine};
use crate::scanner::walker::DirectorySnapshot;

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Snapshot equal to the previous one; nothing swept.
    Unchanged,
    /// One sweep resolved every file.
    Swept,
    /// The first sweep left files behind and stall recovery cleared them.
    Recovered,
    /// Stall recovery hit its pass limit (only with a recovery limit set).
    Stalled { passes: u32 },
}

pub struct WatchDaemon {
    engine: SweepEngine,
    wipe: Option<ScheduledWipe>,
    poll_interval: Duration,
    root_wait: Duration,
    recovery_limit: Option<u32>,
    logger: ActivityLoggerHandle,
    config_hash: String,
}

impl WatchDaemon {
    pub fn new(engine: SweepEngine, wipe: Option<ScheduledWipe>) -> Self {
        let logger = engine.logger().clone();
        Self {
            poll_interval: engine.interval(),
            engine,
            wipe,
            root_wait: Duration::from_secs(300),
            recovery_limit: None,
            logger,
            config_hash: String::new(),
        }
    }

    /// Daemon wired from a validated config.
    pub fn from_config(config: &Config, logger: ActivityLoggerHandle) -> Self {
        let engine = SweepEngine::from_config(config).with_logger(logger.clone());
        let wipe = config
            .cleanup
            .enabled
            .then(|| ScheduledWipe::from_config(config, engine.remover().clone(), logger));
        let mut daemon = Self::new(engine, wipe).with_root_wait(config.watch.root_wait());
        daemon.config_hash = config.stable_hash().unwrap_or_default();
        daemon
    }

    #[must_use]
    pub fn with_root_wait(mut self, root_wait: Duration) -> Self {
        self.root_wait = root_wait;
        self
    }

    /// Cap stall recovery at `max_passes` per tick instead of looping until
    /// the directory settles.
    #[must_use]
    pub fn with_recovery_limit(mut self, max_passes: u32) -> Self {
        self.recovery_limit = Some(max_passes);
        self
    }

    pub fn engine(&self) -> &SweepEngine {
        &self.engine
    }

    pub fn root(&self) -> &Path {
        self.engine.root()
    }

    /// Run until a non-recoverable error. Never returns `Ok` on its own.
    pub fn run(&mut self) -> Result<()> {
        self.logger.send(ActivityEvent::DaemonStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: self.config_hash.clone(),
            root: self.root().to_path_buf(),
        });
        eprintln!(
            "[DSW-DAEMON] watching {} (poll {}s)",
            self.root().display(),
            self.poll_interval.as_secs()
        );

        loop {
            self.wait_for_root();
            let mut previous = None;

            loop {
                match self.tick(&mut previous) {
                    Ok(TickOutcome::Unchanged | TickOutcome::Swept) => {
                        thread::sleep(self.poll_interval);
                    }
                    // Recovery already paused after its last pass.
                    Ok(TickOutcome::Recovered | TickOutcome::Stalled { .. }) => {}
                    Err(DswError::RootUnavailable { path }) => {
                        eprintln!(
                            "[DSW-DAEMON] watch root {} disappeared, waiting for it",
                            path.display()
                        );
                        break;
                    }
                    Err(e) => {
                        self.logger.send(ActivityEvent::from_error(&e));
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Block until the root exists, retrying every `root_wait`.
    pub fn wait_for_root(&self) {
        while !self.root().exists() {
            self.logger.send(ActivityEvent::RootWaiting {
                root: self.root().to_path_buf(),
                retry_secs: self.root_wait.as_secs(),
            });
            eprintln!(
                "[DSW-DAEMON] watch root {} not found, retrying in {}s",
                self.root().display(),
                self.root_wait.as_secs()
            );
            thread::sleep(self.root_wait);
        }
    }

    /// One loop iteration without the trailing poll sleep. `previous` is the
    /// last adopted snapshot and is updated in place.
    pub fn tick(&mut self, previous: &mut Option<DirectorySnapshot>) -> Result<TickOutcome> {
        if let Some(wipe) = self.wipe.as_mut() {
            wipe.run_pending();
        }

        let current = self.engine.snapshot()?;
        if previous.as_ref() == Some(&current) {
            return Ok(TickOutcome::Unchanged);
        }
        let diff = previous
            .as_ref()
            .map_or_else(|| DirectorySnapshot::default().diff(&current), |p| p.diff(&current));
        self.logger.send(ActivityEvent::ChangeDetected {
            added: diff.added.len(),
            removed: diff.removed.len(),
        });

        let report = self.engine.sweep(&current)?;
        if report.all_resolved {
            *previous = Some(report.snapshot);
            return Ok(TickOutcome::Swept);
        }

        eprintln!(
            "[DSW-DAEMON] {} file(s) unresolved, entering stall recovery",
            report.unresolved_count()
        );
        let engine = &self.engine;
        let wipe = &mut self.wipe;
        let outcome = engine.recover_with(self.recovery_limit, &mut || {
            if let Some(wipe) = wipe.as_mut() {
                wipe.run_pending();
            }
        })?;

        Ok(match outcome {
            RecoveryOutcome::Converged(snapshot) => {
                *previous = Some(snapshot);
                TickOutcome::Recovered
            }
            RecoveryOutcome::Exhausted { passes, snapshot } => {
                *previous = Some(snapshot);
                TickOutcome::Stalled { passes }
            }
        })
    }
}
