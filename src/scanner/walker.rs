//! Directory snapshot enumerator.
//!
//! The walker is the "eyes" of the sweep: it lists every file below the watch
//! root into a [`DirectorySnapshot`]. Each recursive call builds and returns its
//! own set which the parent merges, so there is no shared accumulator.
//!
//! Failure model: an unreadable *root* is an error (the poller decides how to
//! wait and retry). A subdirectory that vanishes or becomes unreadable while the
//! walk is in progress is skipped, since other processes mutate the drop folder
//! concurrently.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::collections::btree_set;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::core::errors::{DswError, Result};

/// The set of file paths under a directory tree at one instant.
///
/// Equality is set membership. Members are regular files and symlinks that
/// resolve to a regular file. Directory symlinks are neither listed nor
/// followed, so the walk cannot loop; dangling links and special files are
/// left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    files: BTreeSet<PathBuf>,
}

/// Paths that appeared or disappeared between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl DirectorySnapshot {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    pub fn iter(&self) -> btree_set::Iter<'_, PathBuf> {
        self.files.iter()
    }

    /// What changed going from `self` to `newer`.
    pub fn diff(&self, newer: &Self) -> SnapshotDiff {
        SnapshotDiff {
            added: newer.files.difference(&self.files).cloned().collect(),
            removed: self.files.difference(&newer.files).cloned().collect(),
        }
    }

    fn merge(&mut self, other: Self) {
        self.files.extend(other.files);
    }
}

impl FromIterator<PathBuf> for DirectorySnapshot {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a DirectorySnapshot {
    type Item = &'a PathBuf;
    type IntoIter = btree_set::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

impl IntoIterator for DirectorySnapshot {
    type Item = PathBuf;
    type IntoIter = btree_set::IntoIter<PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

/// Recursively list every file under `root`.
///
/// Returns [`DswError::RootUnavailable`] when `root` does not exist and
/// [`DswError::Io`] for any other failure to read `root` itself.
pub fn enumerate(root: &Path) -> Result<DirectorySnapshot> {
    let entries = fs::read_dir(root).map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            DswError::RootUnavailable {
                path: root.to_path_buf(),
            }
        } else {
            DswError::io(root, source)
        }
    })?;
    Ok(collect_entries(entries))
}

fn enumerate_subtree(dir: &Path) -> DirectorySnapshot {
    match fs::read_dir(dir) {
        Ok(entries) => collect_entries(entries),
        // Vanished or locked mid-walk: treat the subtree as empty.
        Err(_) => DirectorySnapshot::default(),
    }
}

fn collect_entries(entries: fs::ReadDir) -> DirectorySnapshot {
    let mut snapshot = DirectorySnapshot::default();
    for entry in entries.flatten() {
        let path = entry.path();
        // file_type() does not follow symlinks.
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            snapshot.merge(enumerate_subtree(&path));
        } else if file_type.is_file()
            || (file_type.is_symlink() && fs::metadata(&path).is_ok_and(|m| m.is_file()))
        {
            snapshot.files.insert(path);
        }
    }
    snapshot
}
