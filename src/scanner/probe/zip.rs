//! Zip probe: open the central directory and stream every entry through its
//! CRC check, the equivalent of a full integrity test.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::Path;

use ::zip::ZipArchive;
use ::zip::result::ZipError;

use super::{ContainerProbe, Inspection};

/// Probe backed by the `zip` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipProbe;

impl ContainerProbe for ZipProbe {
    fn inspect(&self, path: &Path) -> io::Result<Inspection> {
        let file = File::open(path)?;
        Ok(inspect_reader(BufReader::new(file)))
    }
}

/// Inspect an in-memory or on-disk zip stream.
pub fn inspect_reader<R: Read + Seek>(reader: R) -> Inspection {
    let mut archive = match ZipArchive::new(reader) {
        Ok(archive) => archive,
        Err(e) => return Inspection::Corrupt(e.to_string()),
    };

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(ZipError::UnsupportedArchive(ZipError::PASSWORD_REQUIRED)) => {
                return Inspection::PasswordRequired;
            }
            // AES entries without the aes-crypto backend.
            Err(ZipError::UnsupportedArchive(msg)) if msg.contains("encrypted") => {
                return Inspection::PasswordRequired;
            }
            Err(e) => return Inspection::Corrupt(e.to_string()),
        };
        if entry.is_dir() {
            continue;
        }
        // Reading to the end verifies the stored CRC-32.
        if let Err(e) = io::copy(&mut entry, &mut io::sink()) {
            return Inspection::Corrupt(format!("entry {}: {e}", entry.name()));
        }
    }

    Inspection::Unprotected
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    use ::zip::ZipWriter;
    use ::zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn valid_zip_is_unprotected() {
        let bytes = build_zip(&[("report.txt", b"quarterly numbers"), ("b.csv", b"1,2,3")]);
        assert_eq!(inspect_reader(Cursor::new(bytes)), Inspection::Unprotected);
    }

    #[test]
    fn zipcrypto_entry_needs_password() {
        use ::zip::unstable::write::FileOptionsExt;

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("readme.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"public").unwrap();
        writer
            .start_file(
                "payroll.xlsx",
                SimpleFileOptions::default().with_deprecated_encryption(b"hunter2"),
            )
            .unwrap();
        writer.write_all(b"salaries and bonuses").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert_eq!(
            inspect_reader(Cursor::new(bytes)),
            Inspection::PasswordRequired
        );
    }

    #[test]
    fn empty_zip_is_unprotected() {
        let bytes = build_zip(&[]);
        assert_eq!(inspect_reader(Cursor::new(bytes)), Inspection::Unprotected);
    }

    #[test]
    fn garbage_is_corrupt() {
        let inspection = inspect_reader(Cursor::new(b"definitely not a zip".to_vec()));
        assert!(matches!(inspection, Inspection::Corrupt(_)), "{inspection:?}");
    }

    #[test]
    fn truncated_zip_is_corrupt() {
        let mut bytes = build_zip(&[("a.txt", b"hello hello hello")]);
        bytes.truncate(bytes.len() / 2);
        let inspection = inspect_reader(Cursor::new(bytes));
        assert!(matches!(inspection, Inspection::Corrupt(_)), "{inspection:?}");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ZipProbe.inspect(&dir.path().join("gone.zip")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
