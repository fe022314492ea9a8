//! Error journal: append-only JSONL of fatal errors and panics, each with a
//! captured backtrace. Always on, independent of the activity log switch.

#![allow(missing_docs)]

use std::backtrace::Backtrace;
use std::panic;
use std::path::{Path, PathBuf};

use crate::core::errors::DswError;
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Where in the program an error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// Startup and shutdown around the daemon loop.
    Main,
    /// The watch loop itself.
    Check,
}

impl Component {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Check => "check",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorJournal {
    config: JsonlConfig,
}

impl ErrorJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            config: JsonlConfig::for_path(path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn record_error(&self, component: Component, error: &DswError) {
        self.record(component, Some(error.code()), &error.to_string());
    }

    /// Append one record. Opens and closes the file per record; journal
    /// writes are rare and must survive an imminent exit.
    pub fn record(&self, component: Component, code: Option<&str>, message: &str) {
        let mut entry = LogEntry::new(EventType::Error, Severity::Critical);
        entry.component = Some(component.label().to_string());
        entry.error_code = code.map(str::to_string);
        entry.error_message = Some(message.to_string());
        entry.backtrace = Some(Backtrace::force_capture().to_string());
        entry.ok = Some(false);

        let mut writer = JsonlWriter::open(self.config.clone());
        writer.write_entry(&entry);
        writer.fsync();
    }

    /// Journal every panic under `component`, then defer to the previous hook.
    pub fn install_panic_hook(&self, component: Component) {
        let journal = self.clone();
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let runtime = DswError::Runtime {
                details: format!("panic: {info}"),
            };
            journal.record_error(component, &runtime);
            previous(info);
        }));
    }
}
