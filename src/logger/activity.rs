//! Activity logger: a dedicated thread that owns the [`JsonlWriter`].
//!
//! The sweep and the daemon loop send [`ActivityEvent`]s through a bounded
//! crossbeam channel with `try_send`, so a slow disk never stalls the poller.
//! Events that do not fit are counted and reported on the next line written.
//! With logging disabled the handle is a channel nobody reads; every send is a
//! no-op.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{DswError, Result};
use crate::core::paths::extension_key;
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
use crate::scanner::classifier::Verdict;

const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── events ────────────────────

#[derive(Debug, Clone)]
pub enum ActivityEvent {
    DaemonStarted {
        version: String,
        config_hash: String,
        root: PathBuf,
    },
    RootWaiting {
        root: PathBuf,
        retry_secs: u64,
    },
    /// The snapshot differs from the last adopted one.
    ChangeDetected {
        added: usize,
        removed: usize,
    },
    FileInspected {
        path: PathBuf,
    },
    FileDeleted {
        path: PathBuf,
    },
    FilePreserved {
        path: PathBuf,
        verdict: Verdict,
    },
    FileDeleteFailed {
        path: PathBuf,
    },
    InspectionFailed {
        path: PathBuf,
        verdict: Verdict,
    },
    SweepCompleted {
        files: usize,
        unresolved: usize,
        duration_ms: u64,
    },
    StallRecovery {
        pass: u32,
        unresolved: usize,
    },
    WipeEntryRemoved {
        path: PathBuf,
    },
    WipeCompleted {
        removed: usize,
        failed: usize,
    },
    Error {
        code: String,
        message: String,
        retryable: bool,
    },
    /// Flush and stop the logger thread.
    Shutdown,
}

impl ActivityEvent {
    pub fn from_error(error: &DswError) -> Self {
        Self::Error {
            code: error.code().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }

    /// The per-file event a sweep emits for a verdict, if any.
    pub fn for_verdict(path: &Path, verdict: Verdict) -> Option<Self> {
        let path = path.to_path_buf();
        match verdict {
            Verdict::Deleted => Some(Self::FileDeleted { path }),
            Verdict::Preserved(_) => Some(Self::FilePreserved { path, verdict }),
            Verdict::DeleteFailed => Some(Self::FileDeleteFailed { path }),
            Verdict::InspectionFailed(_) => Some(Self::InspectionFailed { path, verdict }),
            Verdict::Skipped | Verdict::Vanished => None,
        }
    }
}

// ──────────────────── handle ────────────────────

/// Cloneable sending side of the logger.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// A handle whose events go nowhere.
    pub fn disabled() -> Self {
        let (tx, _rx) = bounded(1);
        Self {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Non-blocking send. A full channel drops the event and bumps the counter.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Join its handle to wait.
    pub fn shutdown(&self) {
        let _ = self.tx.send_timeout(
            ActivityEvent::Shutdown,
            std::time::Duration::from_secs(1),
        );
    }
}

// ──────────────────── spawn ────────────────────

#[derive(Debug, Clone)]
pub struct ActivityLoggerConfig {
    pub jsonl: JsonlConfig,
    pub channel_capacity: usize,
}

impl ActivityLoggerConfig {
    pub fn new(jsonl: JsonlConfig) -> Self {
        Self {
            jsonl,
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Start the logger thread. It runs until [`ActivityLoggerHandle::shutdown`]
/// or until every handle is dropped.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: Arc::clone(&dropped),
    };

    let join = thread::Builder::new()
        .name("dsw-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config.jsonl, &dropped))
        .map_err(|e| DswError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, jsonl: JsonlConfig, dropped: &AtomicU64) {
    let mut writer = JsonlWriter::open(jsonl);

    while let Ok(event) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            writer.write_entry(
                &LogEntry::new(EventType::Error, Severity::Warning)
                    .with_details(format!("{lost} log events dropped due to back-pressure")),
            );
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }
        writer.write_entry(&event_to_log_entry(&event));
        writer.flush();
    }

    writer.fsync();
}

// ──────────────────── conversion ────────────────────

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::DaemonStarted {
            version,
            config_hash,
            root,
        } => {
            let mut e = LogEntry::new(EventType::DaemonStart, Severity::Info)
                .with_path(root)
                .with_details(format!("version={version} config_hash={config_hash}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::RootWaiting { root, retry_secs } => {
            LogEntry::new(EventType::RootWait, Severity::Warning)
                .with_path(root)
                .with_details(format!("root missing, retry in {retry_secs}s"))
        }
        ActivityEvent::ChangeDetected { added, removed } => {
            LogEntry::new(EventType::ChangeDetected, Severity::Info)
                .with_details(format!("added={added} removed={removed}"))
        }
        ActivityEvent::FileInspected { path } => {
            let mut e = LogEntry::new(EventType::FileInspected, Severity::Info).with_path(path);
            e.ext = Some(extension_key(path));
            e
        }
        ActivityEvent::FileDeleted { path } => {
            let mut e = file_entry(EventType::FileDeleted, Severity::Info, path);
            e.verdict = Some(Verdict::Deleted.label().to_string());
            e.ok = Some(true);
            e
        }
        ActivityEvent::FilePreserved { path, verdict } => {
            let mut e = file_entry(EventType::FilePreserved, Severity::Info, path);
            e.verdict = Some(verdict.to_string());
            e
        }
        ActivityEvent::FileDeleteFailed { path } => {
            let mut e = file_entry(EventType::FileDeleted, Severity::Warning, path);
            e.verdict = Some(Verdict::DeleteFailed.label().to_string());
            e.ok = Some(false);
            e
        }
        ActivityEvent::InspectionFailed { path, verdict } => {
            let mut e = file_entry(EventType::FileInspected, Severity::Warning, path);
            e.verdict = Some(verdict.to_string());
            e.ok = Some(false);
            e
        }
        ActivityEvent::SweepCompleted {
            files,
            unresolved,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::SweepComplete, Severity::Info)
                .with_details(format!("files={files} unresolved={unresolved}"));
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(*unresolved == 0);
            e
        }
        ActivityEvent::StallRecovery { pass, unresolved } => {
            LogEntry::new(EventType::StallRecovery, Severity::Warning)
                .with_details(format!("pass={pass} unresolved={unresolved}"))
        }
        ActivityEvent::WipeEntryRemoved { path } => {
            let mut e = LogEntry::new(EventType::WipeEntryRemoved, Severity::Info).with_path(path);
            e.ok = Some(true);
            e
        }
        ActivityEvent::WipeCompleted { removed, failed } => {
            let mut e = LogEntry::new(EventType::WipeComplete, Severity::Info)
                .with_details(format!("removed={removed} failed={failed}"));
            e.ok = Some(*failed == 0);
            e
        }
        ActivityEvent::Error {
            code,
            message,
            retryable,
        } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical)
                .with_details(format!("retryable={retryable}"));
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::DaemonStop, Severity::Info),
    }
}

fn file_entry(event: EventType, severity: Severity, path: &Path) -> LogEntry {
    let mut e = LogEntry::new(event, severity).with_path(path);
    e.ext = Some(extension_key(path));
    e
}
