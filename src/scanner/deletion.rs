//! Deletion primitive: single-file removal that reports success as a boolean.
//!
//! Nothing here returns an error. A failed removal (permission denied, file in
//! use, another actor deleting it first) is `false`, and the caller decides
//! whether to retry on the next pass.
//!
//! Optional pre-flight: when `check_open_files` is set, a file that some
//! process currently holds open (Linux: `/proc/*/fd`) is left alone, which
//! mirrors the "locked file" behaviour of platforms that refuse such deletes.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for the remover.
#[derive(Debug, Clone, Default)]
pub struct DeletionConfig {
    /// Whether to check /proc for open files before deleting (Linux only).
    pub check_open_files: bool,
}

/// Removes files and top-level entries on behalf of the sweep and the wipe.
#[derive(Debug, Clone, Default)]
pub struct Remover {
    config: DeletionConfig,
}

impl Remover {
    pub fn new(config: DeletionConfig) -> Self {
        Self { config }
    }

    /// Remove one file. `true` only if the file existed and is now gone.
    pub fn delete_file(&self, path: &Path) -> bool {
        // symlink_metadata so a dangling symlink still counts as present.
        if fs::symlink_metadata(path).is_err() {
            return false;
        }
        if self.config.check_open_files && is_path_open(path) {
            return false;
        }
        fs::remove_file(path).is_ok()
    }

    /// Remove one top-level entry: files via [`Remover::delete_file`],
    /// directories recursively. Errors are swallowed.
    pub fn remove_entry(&self, path: &Path) -> bool {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).is_ok(),
            Ok(_) => self.delete_file(path),
            Err(_) => false,
        }
    }
}

/// Unguarded deletion primitive.
pub fn delete_file(path: &Path) -> bool {
    Remover::default().delete_file(path)
}

// ──────────────────── open-file check ────────────────────

/// Check if a path is currently open by any process.
///
/// On Linux, reads `/proc/*/fd` symlinks. Returns false on non-Linux platforms
/// or if /proc is unavailable.
fn is_path_open(target: &Path) -> bool {
    #[cfg(target_os = "linux")]
    {
        is_path_open_linux(target)
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = target;
        false
    }
}

#[cfg(target_os = "linux")]
fn is_path_open_linux(target: &Path) -> bool {
    let Ok(target_canon) = target.canonicalize() else {
        return false;
    };

    let Ok(entries) = fs::read_dir("/proc") else {
        return false;
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
            continue;
        };

        for fd_entry in fds.flatten() {
            if let Ok(link_target) = fs::read_link(fd_entry.path())
                && normalize_fd_link_path(&link_target).as_deref() == Some(target_canon.as_path())
            {
                return true;
            }
        }
    }

    false
}

#[cfg(target_os = "linux")]
fn normalize_fd_link_path(fd_link: &Path) -> Option<PathBuf> {
    let raw = fd_link.to_string_lossy();
    let trimmed = raw
        .strip_suffix(" (deleted)")
        .unwrap_or_else(|| raw.as_ref());
    if !trimmed.starts_with('/') {
        return None;
    }
    let path = Path::new(trimmed);
    Some(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()))
}
