//! Container probes: per-format "does it open / does it need a password" checks.
//!
//! Probes only report what they see. The deletion policy that acts on an
//! [`Inspection`] lives in [`crate::scanner::classifier`].

#![allow(missing_docs)]

pub mod p7m;
pub mod rar;
pub mod sevenz;
pub mod zip;

use std::io;
use std::path::Path;

/// Recognized container types, keyed by lower-cased extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Zip,
    Rar,
    SevenZip,
    P7m,
}

impl ContainerKind {
    pub const ALL: [Self; 4] = [Self::Zip, Self::Rar, Self::SevenZip, Self::P7m];

    /// Map an extension key (`".zip"`, as produced by
    /// [`crate::core::paths::extension_key`]) to a container kind.
    pub fn from_extension(extension_key: &str) -> Option<Self> {
        match extension_key {
            ".zip" => Some(Self::Zip),
            ".rar" => Some(Self::Rar),
            ".7z" => Some(Self::SevenZip),
            ".p7m" => Some(Self::P7m),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Rar => "rar",
            Self::SevenZip => "7z",
            Self::P7m => "p7m",
        }
    }
}

/// What a probe learned about one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    /// Opened and read without a password.
    Unprotected,
    /// A password is needed to open the container or decode its entries.
    PasswordRequired,
    /// The bytes do not carry the signature of the claimed type.
    WrongType,
    /// The signature matched but the structure could not be read.
    Corrupt(String),
    /// A later volume of a multi-part set; only the first volume can answer.
    NeedFirstVolume,
    /// A well-formed signed or enveloped container.
    ValidContainer,
}

/// A format-specific inspector.
///
/// `Err` means the file itself could not be read (vanished, locked, permission
/// denied); format problems are reported through [`Inspection`].
pub trait ContainerProbe: Send + Sync {
    fn inspect(&self, path: &Path) -> io::Result<Inspection>;
}

/// The built-in probe for a container kind.
pub fn builtin(kind: ContainerKind) -> Box<dyn ContainerProbe> {
    match kind {
        ContainerKind::Zip => Box::new(zip::ZipProbe),
        ContainerKind::Rar => Box::new(rar::RarProbe),
        ContainerKind::SevenZip => Box::new(sevenz::SevenZipProbe),
        ContainerKind::P7m => Box::new(p7m::P7mProbe),
    }
}
