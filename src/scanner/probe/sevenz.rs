//! 7z probe: open with an empty password, then decode every entry.
//!
//! An archive with encrypted headers fails at open; one with encrypted
//! content only fails once a stream is decoded, so both stages are run.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sevenz_rust::{Error as SevenZError, Password, SevenZReader};

use super::{ContainerProbe, Inspection};

/// Probe backed by `sevenz-rust`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SevenZipProbe;

impl ContainerProbe for SevenZipProbe {
    fn inspect(&self, path: &Path) -> io::Result<Inspection> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        let mut reader = match SevenZReader::new(file, len, Password::empty()) {
            Ok(reader) => reader,
            Err(e) => return Ok(classify_error(&e)),
        };

        let decoded = reader.for_each_entries(|_entry, stream: &mut dyn Read| {
            io::copy(stream, &mut io::sink())?;
            Ok(true)
        });

        Ok(match decoded {
            Ok(()) => Inspection::Unprotected,
            Err(e) => classify_error(&e),
        })
    }
}

fn classify_error(error: &SevenZError) -> Inspection {
    match error {
        SevenZError::PasswordRequired | SevenZError::MaybeBadPassword(_) => {
            Inspection::PasswordRequired
        }
        SevenZError::BadSignature(_) => Inspection::WrongType,
        other => {
            let message = other.to_string();
            if message.to_ascii_lowercase().contains("password") {
                Inspection::PasswordRequired
            } else {
                Inspection::Corrupt(message)
            }
        }
    }
}
