#![forbid(unsafe_code)]

//! drop_sweeper (dsw): keeps a drop folder clear of junk while leaving
//! password-protected deliverables in place.
//!
//! The daemon polls a directory tree and, whenever its file set changes,
//! sweeps it:
//! 1. **Containers** (`.zip`, `.rar`, `.7z`, `.p7m`) are inspected; protected
//!    or signed ones are kept, readable ones are deleted.
//! 2. **Everything else** is deleted, unless its extension is excluded.
//! 3. **Stall recovery** re-sweeps while anything is left unresolved.
//! 4. **Scheduled wipe** optionally clears the whole folder off-hours.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use drop_sweeper::prelude::*;
//!
//! let engine = SweepEngine::new("/srv/drop", ExcludeSet::parse_list("tmp"),
//!     Classifier::new(Remover::default()));
//! let report = engine.sweep(&engine.snapshot()?)?;
//! println!("all resolved: {}", report.all_resolved);
//! # Ok::<(), DswError>(())
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod logger;
pub mod scanner;
