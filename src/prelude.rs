//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use drop_sweeper::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, ExcludeSet};
pub use crate::core::errors::{DswError, Result};

// Scanner
pub use crate::scanner::classifier::{Classifier, PreserveReason, Verdict};
pub use crate::scanner::deletion::{DeletionConfig, Remover};
pub use crate::scanner::probe::{ContainerKind, ContainerProbe, Inspection};
pub use crate::scanner::sweep::{RecoveryOutcome, SweepEngine, SweepReport};
pub use crate::scanner::walker::{DirectorySnapshot, enumerate};

// Daemon
pub use crate::daemon::loop_main::{TickOutcome, WatchDaemon};
pub use crate::daemon::schedule::{ScheduledWipe, WipeSchedule, WipeWindow};

// Logging
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
pub use crate::logger::journal::ErrorJournal;
