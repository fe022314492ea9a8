//! Configuration system: TOML file + env var overrides + CLI overrides.
//!
//! Resolution order: built-in defaults, then the optional TOML file, then
//! `DSW_*` environment variables, then command-line flags. [`Config::validated`]
//! normalizes and checks the merged result once; it is immutable afterwards.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{DswError, Result};
use crate::core::paths::resolve_absolute_path;

/// Full drop_sweeper configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub watch: WatchConfig,
    pub cleanup: CleanupConfig,
    pub logging: LoggingConfig,
    /// File the config was loaded from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Watched directory and polling cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchConfig {
    pub root: PathBuf,
    pub poll_interval_secs: u64,
    /// Retry period while the root does not exist yet.
    pub root_wait_secs: u64,
    /// Extensions never inspected or deleted (`tmp`, `.part`, ...).
    pub exclude: Vec<String>,
    /// Refuse to delete files that some process holds open (Linux only).
    pub check_open_files: bool,
}

/// Scheduled full wipe of the root's top-level entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CleanupConfig {
    pub enabled: bool,
    /// Wipe fires when the local hour is at or after this value...
    pub hour: u32,
    /// ...or at or before this early-morning hour.
    pub quiet_end_hour: u32,
    pub check_interval_secs: u64,
}

/// Activity log and error journal locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enables the per-file activity log. The error journal is always written.
    pub enabled: bool,
    pub dir: PathBuf,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            poll_interval_secs: 15,
            root_wait_secs: 300,
            exclude: Vec::new(),
            check_open_files: false,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            hour: 22,
            quiet_end_hour: 6,
            check_interval_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: data_dir(),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 5,
        }
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[DSW-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("dsw")
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn root_wait(&self) -> Duration {
        Duration::from_secs(self.root_wait_secs)
    }

    pub fn exclude_set(&self) -> ExcludeSet {
        ExcludeSet::new(&self.exclude)
    }
}

impl CleanupConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl LoggingConfig {
    pub fn activity_log_path(&self) -> PathBuf {
        self.dir.join("activity.jsonl")
    }

    pub fn error_journal_path(&self) -> PathBuf {
        self.dir.join("errors.log")
    }
}

/// Values supplied on the command line; `None` leaves the loaded value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub root: Option<PathBuf>,
    pub poll_interval_secs: Option<u64>,
    pub cleanup_hour: Option<u32>,
    pub logging_enabled: bool,
    pub cleanup_enabled: bool,
    pub exclude: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        home_dir().join(".config").join("dsw").join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from the default path;
    /// defaults are used. The result is not validated yet; see [`Config::validated`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| DswError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let mut parsed: Self = toml::from_str(&raw)?;
            parsed.source = Some(path_buf);
            parsed
        } else if path.is_some() {
            return Err(DswError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(env_var)?;
        Ok(cfg)
    }

    /// Layer command-line values on top of the file/env configuration.
    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(root) = &cli.root {
            self.watch.root.clone_from(root);
        }
        if let Some(secs) = cli.poll_interval_secs {
            self.watch.poll_interval_secs = secs;
        }
        if let Some(hour) = cli.cleanup_hour {
            self.cleanup.hour = hour;
        }
        if let Some(raw) = &cli.exclude {
            self.watch.exclude = split_list(raw);
        }
        if let Some(dir) = &cli.log_dir {
            self.logging.dir.clone_from(dir);
        }
        // Flags only switch features on; absence keeps the file/env value.
        self.logging.enabled |= cli.logging_enabled;
        self.cleanup.enabled |= cli.cleanup_enabled;
    }

    /// Normalize paths and extension lists, then validate.
    pub fn validated(mut self) -> Result<Self> {
        self.normalize();
        self.validate()?;
        Ok(self)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON so the value is stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("DSW_WATCH_ROOT") {
            self.watch.root = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("DSW_WATCH_POLL_INTERVAL_SECS") {
            self.watch.poll_interval_secs = parse_env("DSW_WATCH_POLL_INTERVAL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("DSW_WATCH_ROOT_WAIT_SECS") {
            self.watch.root_wait_secs = parse_env("DSW_WATCH_ROOT_WAIT_SECS", &raw)?;
        }
        if let Some(raw) = lookup("DSW_WATCH_EXCLUDE") {
            self.watch.exclude = split_list(&raw);
        }
        if let Some(raw) = lookup("DSW_WATCH_CHECK_OPEN_FILES") {
            self.watch.check_open_files = parse_env("DSW_WATCH_CHECK_OPEN_FILES", &raw)?;
        }

        if let Some(raw) = lookup("DSW_CLEANUP_ENABLED") {
            self.cleanup.enabled = parse_env("DSW_CLEANUP_ENABLED", &raw)?;
        }
        if let Some(raw) = lookup("DSW_CLEANUP_HOUR") {
            self.cleanup.hour = parse_env("DSW_CLEANUP_HOUR", &raw)?;
        }
        if let Some(raw) = lookup("DSW_CLEANUP_QUIET_END_HOUR") {
            self.cleanup.quiet_end_hour = parse_env("DSW_CLEANUP_QUIET_END_HOUR", &raw)?;
        }
        if let Some(raw) = lookup("DSW_CLEANUP_CHECK_INTERVAL_SECS") {
            self.cleanup.check_interval_secs =
                parse_env("DSW_CLEANUP_CHECK_INTERVAL_SECS", &raw)?;
        }

        if let Some(raw) = lookup("DSW_LOGGING_ENABLED") {
            self.logging.enabled = parse_env("DSW_LOGGING_ENABLED", &raw)?;
        }
        if let Some(raw) = lookup("DSW_LOGGING_DIR") {
            self.logging.dir = PathBuf::from(raw);
        }

        Ok(())
    }

    fn normalize(&mut self) {
        if !self.watch.root.as_os_str().is_empty() {
            self.watch.root = resolve_absolute_path(&self.watch.root);
        }
        if !self.logging.dir.as_os_str().is_empty() {
            self.logging.dir = resolve_absolute_path(&self.logging.dir);
        }
        self.watch.exclude = self.watch.exclude_set().iter().map(str::to_string).collect();
    }

    fn validate(&self) -> Result<()> {
        if self.watch.root.as_os_str().is_empty() {
            return Err(DswError::InvalidConfig {
                details: "watch.root must be set".to_string(),
            });
        }
        if self.watch.poll_interval_secs == 0 {
            return Err(DswError::InvalidConfig {
                details: "watch.poll_interval_secs must be >= 1".to_string(),
            });
        }
        if self.watch.root_wait_secs == 0 {
            return Err(DswError::InvalidConfig {
                details: "watch.root_wait_secs must be >= 1".to_string(),
            });
        }
        for (name, hour) in [
            ("cleanup.hour", self.cleanup.hour),
            ("cleanup.quiet_end_hour", self.cleanup.quiet_end_hour),
        ] {
            if hour > 23 {
                return Err(DswError::InvalidConfig {
                    details: format!("{name} must be in [0, 23], got {hour}"),
                });
            }
        }
        if self.cleanup.check_interval_secs == 0 {
            return Err(DswError::InvalidConfig {
                details: "cleanup.check_interval_secs must be >= 1".to_string(),
            });
        }
        if self.logging.max_rotated_files == 0 || self.logging.max_size_bytes < 1024 {
            return Err(DswError::InvalidConfig {
                details: "logging.max_rotated_files must be >= 1 and logging.max_size_bytes >= 1024"
                    .to_string(),
            });
        }
        Ok(())
    }
}

// ──────────────────── exclude set ────────────────────

/// Extensions exempt from inspection and deletion.
///
/// Entries are stored lower-cased with a single leading dot, so they compare
/// directly against [`crate::core::paths::extension_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludeSet {
    extensions: BTreeSet<String>,
}

impl ExcludeSet {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: items
                .into_iter()
                .filter_map(|raw| Self::normalize(raw.as_ref()))
                .collect(),
        }
    }

    /// Parse a comma-separated list such as `"tmp, part,.LOG"`.
    pub fn parse_list(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    /// Trim, lower-case, and dot-prefix one extension. Blank input yields `None`.
    pub fn normalize(raw: &str) -> Option<String> {
        let trimmed = raw
            .trim_start_matches(|c: char| c == '.' || c.is_whitespace())
            .trim_end();
        if trimmed.is_empty() {
            return None;
        }
        Some(format!(".{}", trimmed.to_ascii_lowercase()))
    }

    pub fn contains(&self, extension_key: &str) -> bool {
        self.extensions.contains(extension_key)
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }
}

// ──────────────────── env helpers ────────────────────

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| DswError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
