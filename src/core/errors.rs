//! DSW-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DswError>;

/// Top-level error type for drop_sweeper.
#[derive(Debug, Error)]
pub enum DswError {
    #[error("[DSW-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DSW-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DSW-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DSW-2001] watch root unavailable: {path}")]
    RootUnavailable { path: PathBuf },

    #[error("[DSW-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DSW-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DSW-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl DswError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DSW-1001",
            Self::MissingConfig { .. } => "DSW-1002",
            Self::ConfigParse { .. } => "DSW-1003",
            Self::RootUnavailable { .. } => "DSW-2001",
            Self::Serialization { .. } => "DSW-2101",
            Self::Io { .. } => "DSW-3002",
            Self::Runtime { .. } => "DSW-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RootUnavailable { .. } | Self::Io { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for DswError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DswError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
