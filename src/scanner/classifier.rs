//! Container classifier: turns a probe [`Inspection`] into a per-file
//! [`Verdict`] and performs the deletion when the policy says so.
//!
//! Policy per container kind:
//!
//! | kind | deleted when                          | preserved when                     |
//! |------|---------------------------------------|------------------------------------|
//! | zip  | every entry reads back without error  | password needed, or any failure    |
//! | rar  | no password, not a rar, or corrupt    | password needed (self or part1)    |
//! | 7z   | no password, or any non-password error| password needed                    |
//! | p7m  | not a PKCS#7 `ContentInfo`            | parses as PKCS#7                   |
//!
//! Read failures on the file itself never escape: a vanished file is
//! [`Verdict::Vanished`], anything else is [`Verdict::InspectionFailed`] and is
//! retried on the next pass.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::scanner::deletion::Remover;
use crate::scanner::probe::{self, ContainerKind, ContainerProbe, Inspection};

/// Why a file was left in place on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreserveReason {
    PasswordProtected,
    /// Zip that failed to open or verify.
    IntegrityCheckFailed,
    /// p7m that parsed as PKCS#7.
    ValidSignedContainer,
}

impl PreserveReason {
    pub const fn label(self) -> &'static str {
        match self {
            Self::PasswordProtected => "password_protected",
            Self::IntegrityCheckFailed => "integrity_check_failed",
            Self::ValidSignedContainer => "valid_signed_container",
        }
    }
}

/// Outcome of processing one file in a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Deleted,
    Preserved(PreserveReason),
    /// Excluded extension; never inspected.
    Skipped,
    /// Gone before or during inspection.
    Vanished,
    /// Removal was attempted and the file is still there.
    DeleteFailed,
    /// The file could not be read (permissions, lock).
    InspectionFailed(io::ErrorKind),
}

impl Verdict {
    /// Whether this file needs no further attention. A signed container is
    /// kept for good; a protected or unverifiable archive is re-checked.
    pub const fn is_resolved(self) -> bool {
        matches!(
            self,
            Self::Deleted
                | Self::Skipped
                | Self::Vanished
                | Self::Preserved(PreserveReason::ValidSignedContainer)
        )
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::Preserved(_) => "preserved",
            Self::Skipped => "skipped",
            Self::Vanished => "vanished",
            Self::DeleteFailed => "delete_failed",
            Self::InspectionFailed(_) => "inspection_failed",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preserved(reason) => write!(f, "preserved ({})", reason.label()),
            Self::InspectionFailed(kind) => write!(f, "inspection_failed ({kind})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Applies the per-kind deletion policy.
pub struct Classifier {
    remover: Remover,
    probes: HashMap<ContainerKind, Box<dyn ContainerProbe>>,
}

impl Classifier {
    /// Classifier with the built-in probe for every container kind.
    pub fn new(remover: Remover) -> Self {
        let probes = ContainerKind::ALL
            .into_iter()
            .map(|kind| (kind, probe::builtin(kind)))
            .collect();
        Self { remover, probes }
    }

    /// Replace the probe used for one container kind.
    #[must_use]
    pub fn with_probe(mut self, kind: ContainerKind, probe: impl ContainerProbe + 'static) -> Self {
        self.probes.insert(kind, Box::new(probe));
        self
    }

    pub fn remover(&self) -> &Remover {
        &self.remover
    }

    /// Inspect a recognized container and act on the result.
    pub fn classify(&self, path: &Path, kind: ContainerKind) -> Verdict {
        if fs::symlink_metadata(path).is_err() {
            return Verdict::Vanished;
        }

        let inspection = match self.inspect(kind, path) {
            Ok(inspection) => inspection,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Verdict::Vanished,
            Err(e) => return Verdict::InspectionFailed(e.kind()),
        };

        match (kind, inspection) {
            (_, Inspection::PasswordRequired) => {
                Verdict::Preserved(PreserveReason::PasswordProtected)
            }
            (ContainerKind::Zip, Inspection::Unprotected) => self.delete(path),
            (ContainerKind::Zip, _) => Verdict::Preserved(PreserveReason::IntegrityCheckFailed),
            (ContainerKind::Rar, Inspection::NeedFirstVolume) => self.classify_rar_fragment(path),
            (ContainerKind::P7m, Inspection::ValidContainer) => {
                Verdict::Preserved(PreserveReason::ValidSignedContainer)
            }
            // Mislabeled, corrupt, or readable without a password.
            _ => self.delete(path),
        }
    }

    /// Delete unconditionally, telling a lost race apart from a real failure.
    pub fn delete(&self, path: &Path) -> Verdict {
        if self.remover.delete_file(path) {
            Verdict::Deleted
        } else if fs::symlink_metadata(path).is_err() {
            Verdict::Vanished
        } else {
            Verdict::DeleteFailed
        }
    }

    /// A later volume is judged by its first volume: keep it only when the
    /// set is password protected. An orphaned part is deleted.
    fn classify_rar_fragment(&self, path: &Path) -> Verdict {
        let Some(first) = first_volume_sibling(path) else {
            return self.delete(path);
        };
        if fs::metadata(&first).is_err() {
            return self.delete(path);
        }
        match self.inspect(ContainerKind::Rar, &first) {
            Ok(Inspection::PasswordRequired) => {
                Verdict::Preserved(PreserveReason::PasswordProtected)
            }
            Ok(_) => self.delete(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.delete(path),
            Err(e) => Verdict::InspectionFailed(e.kind()),
        }
    }

    fn inspect(&self, kind: ContainerKind, path: &Path) -> io::Result<Inspection> {
        match self.probes.get(&kind) {
            Some(probe) => probe.inspect(path),
            None => probe::builtin(kind).inspect(path),
        }
    }
}

/// `set.part3.rar` → `set.part1.rar` in the same directory.
///
/// The last two dot segments of the file name are replaced. Names with fewer
/// than three segments, or nothing left before them, have no sibling.
pub fn first_volume_sibling(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() < 3 {
        return None;
    }
    let stem = segments[..segments.len() - 2].join(".");
    if stem.is_empty() {
        return None;
    }
    Some(path.with_file_name(format!("{stem}.part1.rar")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct Fixed(Inspection);

    impl ContainerProbe for Fixed {
        fn inspect(&self, _path: &Path) -> io::Result<Inspection> {
            Ok(self.0.clone())
        }
    }

    /// Answers by file name; unknown names look like non-rar bytes.
    struct ByName(Vec<(&'static str, Inspection)>);

    impl ContainerProbe for ByName {
        fn inspect(&self, path: &Path) -> io::Result<Inspection> {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            Ok(self
                .0
                .iter()
                .find(|(n, _)| *n == name)
                .map_or(Inspection::WrongType, |(_, i)| i.clone()))
        }
    }

    struct Failing(io::ErrorKind);

    impl ContainerProbe for Failing {
        fn inspect(&self, _path: &Path) -> io::Result<Inspection> {
            Err(io::Error::from(self.0))
        }
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"fixture").unwrap();
        path
    }

    fn valid_zip(path: &Path) {
        let file = fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("inner.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"payload").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn valid_zip_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.zip");
        valid_zip(&path);

        let verdict = Classifier::new(Remover::default()).classify(&path, ContainerKind::Zip);
        assert_eq!(verdict, Verdict::Deleted);
        assert!(!path.exists());
    }

    #[test]
    fn broken_zip_is_preserved_and_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "broken.zip");

        let verdict = Classifier::new(Remover::default()).classify(&path, ContainerKind::Zip);
        assert_eq!(
            verdict,
            Verdict::Preserved(PreserveReason::IntegrityCheckFailed)
        );
        assert!(!verdict.is_resolved());
        assert!(path.exists());
    }

    #[test]
    fn password_zip_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "locked.zip");
        let classifier = Classifier::new(Remover::default())
            .with_probe(ContainerKind::Zip, Fixed(Inspection::PasswordRequired));

        assert_eq!(
            classifier.classify(&path, ContainerKind::Zip),
            Verdict::Preserved(PreserveReason::PasswordProtected)
        );
        assert!(path.exists());
    }

    #[test]
    fn mislabeled_rar_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "notes.rar");

        let verdict = Classifier::new(Remover::default()).classify(&path, ContainerKind::Rar);
        assert_eq!(verdict, Verdict::Deleted);
    }

    #[test]
    fn corrupt_rar_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "torn.rar");
        let classifier = Classifier::new(Remover::default())
            .with_probe(ContainerKind::Rar, Fixed(Inspection::Corrupt("eof".into())));

        assert_eq!(classifier.classify(&path, ContainerKind::Rar), Verdict::Deleted);
    }

    #[test]
    fn orphaned_rar_part_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let part = touch(dir.path(), "set.part2.rar");
        let classifier = Classifier::new(Remover::default()).with_probe(
            ContainerKind::Rar,
            ByName(vec![("set.part2.rar", Inspection::NeedFirstVolume)]),
        );

        assert_eq!(classifier.classify(&part, ContainerKind::Rar), Verdict::Deleted);
        assert!(!part.exists());
    }

    #[test]
    fn rar_part_follows_protected_first_volume() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "set.part1.rar");
        let part = touch(dir.path(), "set.part2.rar");
        let classifier = Classifier::new(Remover::default()).with_probe(
            ContainerKind::Rar,
            ByName(vec![
                ("set.part1.rar", Inspection::PasswordRequired),
                ("set.part2.rar", Inspection::NeedFirstVolume),
            ]),
        );

        assert_eq!(
            classifier.classify(&part, ContainerKind::Rar),
            Verdict::Preserved(PreserveReason::PasswordProtected)
        );
        assert!(part.exists());
    }

    #[test]
    fn rar_part_follows_unprotected_first_volume() {
        let dir = tempfile::tempdir().unwrap();
        let first = touch(dir.path(), "set.part1.rar");
        let part = touch(dir.path(), "set.part2.rar");
        let classifier = Classifier::new(Remover::default()).with_probe(
            ContainerKind::Rar,
            ByName(vec![
                ("set.part1.rar", Inspection::Unprotected),
                ("set.part2.rar", Inspection::NeedFirstVolume),
            ]),
        );

        assert_eq!(classifier.classify(&part, ContainerKind::Rar), Verdict::Deleted);
        assert!(first.exists(), "only the inspected part is removed");
    }

    #[test]
    fn seven_zip_policy() {
        let dir = tempfile::tempdir().unwrap();
        let locked = touch(dir.path(), "locked.7z");
        let junk = touch(dir.path(), "junk.7z");

        let protected = Classifier::new(Remover::default())
            .with_probe(ContainerKind::SevenZip, Fixed(Inspection::PasswordRequired));
        assert_eq!(
            protected.classify(&locked, ContainerKind::SevenZip),
            Verdict::Preserved(PreserveReason::PasswordProtected)
        );

        let real = Classifier::new(Remover::default());
        assert_eq!(real.classify(&junk, ContainerKind::SevenZip), Verdict::Deleted);
    }

    #[test]
    fn p7m_policy() {
        let dir = tempfile::tempdir().unwrap();
        let signed = dir.path().join("invoice.p7m");
        fs::write(
            &signed,
            [
                0x30, 0x0B, 0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01,
            ],
        )
        .unwrap();
        let bogus = touch(dir.path(), "bogus.p7m");

        let classifier = Classifier::new(Remover::default());
        assert_eq!(
            classifier.classify(&signed, ContainerKind::P7m),
            Verdict::Preserved(PreserveReason::ValidSignedContainer)
        );
        assert_eq!(classifier.classify(&bogus, ContainerKind::P7m), Verdict::Deleted);
        assert!(signed.exists());
    }

    #[test]
    fn missing_file_is_vanished() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = Classifier::new(Remover::default());
        for kind in ContainerKind::ALL {
            let verdict = classifier.classify(&dir.path().join("ghost.bin"), kind);
            assert_eq!(verdict, Verdict::Vanished);
            assert!(verdict.is_resolved());
        }
    }

    #[test]
    fn unreadable_file_is_inspection_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "locked.zip");
        let classifier = Classifier::new(Remover::default())
            .with_probe(ContainerKind::Zip, Failing(io::ErrorKind::PermissionDenied));

        let verdict = classifier.classify(&path, ContainerKind::Zip);
        assert_eq!(
            verdict,
            Verdict::InspectionFailed(io::ErrorKind::PermissionDenied)
        );
        assert!(!verdict.is_resolved());
    }

    #[test]
    fn probe_losing_race_is_vanished() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "racing.7z");
        let classifier = Classifier::new(Remover::default())
            .with_probe(ContainerKind::SevenZip, Failing(io::ErrorKind::NotFound));

        assert_eq!(
            classifier.classify(&path, ContainerKind::SevenZip),
            Verdict::Vanished
        );
    }

    #[test]
    fn first_volume_sibling_derivation() {
        assert_eq!(
            first_volume_sibling(Path::new("/drop/set.part2.rar")),
            Some(PathBuf::from("/drop/set.part1.rar"))
        );
        assert_eq!(
            first_volume_sibling(Path::new("/drop/a.b.part10.rar")),
            Some(PathBuf::from("/drop/a.b.part1.rar"))
        );
        assert_eq!(first_volume_sibling(Path::new("/drop/set.rar")), None);
        assert_eq!(first_volume_sibling(Path::new("/drop/.part2.rar")), None);
    }

    #[test]
    fn resolution_table() {
        assert!(Verdict::Deleted.is_resolved());
        assert!(Verdict::Skipped.is_resolved());
        assert!(Verdict::Vanished.is_resolved());
        assert!(!Verdict::DeleteFailed.is_resolved());
        assert!(!Verdict::Preserved(PreserveReason::PasswordProtected).is_resolved());
        assert!(!Verdict::Preserved(PreserveReason::IntegrityCheckFailed).is_resolved());
        assert!(Verdict::Preserved(PreserveReason::ValidSignedContainer).is_resolved());
        assert_eq!(
            Verdict::Preserved(PreserveReason::PasswordProtected).to_string(),
            "preserved (password_protected)"
        );
    }
}
