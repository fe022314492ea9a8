//! Command-line definition and dispatch for `dsw`.

use std::io::{self, IsTerminal, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;

use clap::Parser;
use serde_json::{Value, json};
use thiserror::Error;

use drop_sweeper::core::config::{CliOverrides, Config, LoggingConfig};
use drop_sweeper::core::errors::DswError;
use drop_sweeper::daemon::loop_main::WatchDaemon;
use drop_sweeper::logger::activity::{ActivityLoggerConfig, ActivityLoggerHandle, spawn_logger};
use drop_sweeper::logger::journal::{Component, ErrorJournal};
use drop_sweeper::logger::jsonl::JsonlConfig;
use drop_sweeper::scanner::sweep::{RecoveryOutcome, SweepEngine, SweepReport};

/// Keeps a drop folder clear: deletes unprotected archives and clutter,
/// leaves password-protected and signed deliverables in place.
#[derive(Debug, Parser)]
#[command(name = "dsw", author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to monitor and clean.
    #[arg(short, long, value_name = "DIR")]
    path: PathBuf,
    /// Seconds to wait between checks [default: 15].
    #[arg(short, long, value_name = "SECONDS")]
    seconds: Option<u64>,
    /// Hour (0-23) after which the scheduled wipe may run [default: 22].
    #[arg(short, long, value_name = "HOUR")]
    time: Option<u32>,
    /// Write the activity log (activity.jsonl in the log directory).
    #[arg(short, long)]
    log: bool,
    /// Wipe the directory during the off-hours window.
    #[arg(short, long)]
    cleanup: bool,
    /// Comma-separated extensions never inspected or deleted, e.g. `tmp,part`.
    #[arg(short, long, value_name = "EXT,...")]
    exclude: Option<String>,
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Directory for the activity log and the error journal.
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
    /// Sweep once (with one recovery pass), print a summary, and exit.
    #[arg(long)]
    once: bool,
    /// Force JSON output for the --once summary.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            root: Some(self.path.clone()),
            poll_interval_secs: self.seconds,
            cleanup_hour: self.time,
            logging_enabled: self.log,
            cleanup_enabled: self.cleanup,
            exclude: self.exclude.clone(),
            log_dir: self.log_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Dsw(#[from] DswError),
    #[error("{0}")]
    Runtime(String),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

pub fn run(cli: &Cli) -> Result<(), CliError> {
    let config = match load_config(cli) {
        Ok(config) => config,
        Err(e) => {
            let journal_dir = cli
                .log_dir
                .clone()
                .unwrap_or_else(|| LoggingConfig::default().dir);
            ErrorJournal::new(journal_dir.join("errors.log")).record_error(Component::Main, &e);
            return Err(e.into());
        }
    };
    let journal = ErrorJournal::new(config.logging.error_journal_path());

    let (logger, logger_join) = match start_logger(&config) {
        Ok(started) => started,
        Err(e) => {
            journal.record_error(Component::Main, &e);
            return Err(e.into());
        }
    };

    let outcome = if cli.once {
        run_once(cli, &config, &logger)
    } else {
        run_daemon(&config, &logger, &journal)
    };

    if let Err(CliError::Dsw(e)) = &outcome {
        journal.record_error(Component::Check, e);
    }

    logger.shutdown();
    if let Some(join) = logger_join {
        let _ = join.join();
    }
    outcome
}

fn load_config(cli: &Cli) -> Result<Config, DswError> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_cli(&cli.overrides());
    config.validated()
}

fn start_logger(
    config: &Config,
) -> Result<(ActivityLoggerHandle, Option<JoinHandle<()>>), DswError> {
    if !config.logging.enabled {
        return Ok((ActivityLoggerHandle::disabled(), None));
    }
    let jsonl = JsonlConfig {
        max_size_bytes: config.logging.max_size_bytes,
        max_rotated_files: config.logging.max_rotated_files,
        ..JsonlConfig::for_path(config.logging.activity_log_path())
    };
    let (handle, join) = spawn_logger(ActivityLoggerConfig::new(jsonl))?;
    Ok((handle, Some(join)))
}

fn run_daemon(
    config: &Config,
    logger: &ActivityLoggerHandle,
    journal: &ErrorJournal,
) -> Result<(), CliError> {
    if let Ok(hash) = config.stable_hash() {
        eprintln!("[DSW-CONFIG] effective config hash {hash}");
    }
    journal.install_panic_hook(Component::Check);

    let mut daemon = WatchDaemon::from_config(config, logger.clone());
    match panic::catch_unwind(AssertUnwindSafe(|| daemon.run())) {
        Ok(result) => result.map_err(CliError::from),
        // The panic hook already journaled the message and backtrace.
        Err(_) => Err(CliError::Runtime(format!(
            "watch loop panicked, see {}",
            journal.path().display()
        ))),
    }
}

fn run_once(cli: &Cli, config: &Config, logger: &ActivityLoggerHandle) -> Result<(), CliError> {
    let engine = SweepEngine::from_config(config)
        .with_logger(logger.clone())
        .with_interval(Duration::ZERO);
    let files = engine.snapshot()?;
    let report = engine.sweep(&files)?;
    let recovery = if report.all_resolved {
        None
    } else {
        Some(engine.recover_bounded(1)?)
    };

    let summary = once_summary(config, &report, recovery.as_ref());
    match output_mode(cli) {
        OutputMode::Json => write_json_line(&summary)?,
        OutputMode::Human => print_summary_human(&summary)?,
    }
    Ok(())
}

fn once_summary(config: &Config, report: &SweepReport, recovery: Option<&RecoveryOutcome>) -> Value {
    let remaining = recovery.map_or(&report.snapshot, RecoveryOutcome::snapshot);
    let settled = report.all_resolved || matches!(recovery, Some(RecoveryOutcome::Converged(_)));
    let unresolved: Vec<String> = report
        .unresolved()
        .map(|o| format!("{} ({})", o.path.display(), o.verdict))
        .collect();
    json!({
        "root": config.watch.root.display().to_string(),
        "files": report.outcomes.len(),
        "deleted": report.count("deleted"),
        "preserved": report.count("preserved"),
        "skipped": report.count("skipped"),
        "vanished": report.count("vanished"),
        "failed": report.count("delete_failed") + report.count("inspection_failed"),
        "remaining": remaining.len(),
        "settled": settled,
        "unresolved": unresolved,
        "duration_ms": u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
    })
}

fn print_summary_human(summary: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "root:      {}", summary["root"].as_str().unwrap_or(""))?;
    for key in ["files", "deleted", "preserved", "skipped", "vanished", "failed", "remaining"] {
        writeln!(stdout, "{key:<10} {}", summary[key])?;
    }
    writeln!(stdout, "settled:   {}", summary["settled"])?;
    if let Some(unresolved) = summary["unresolved"].as_array() {
        for entry in unresolved {
            writeln!(stdout, "  kept {}", entry.as_str().unwrap_or(""))?;
        }
    }
    Ok(())
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("DSW_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }
    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };
    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn clap_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn path_is_required() {
        assert!(Cli::try_parse_from(["dsw"]).is_err());
        assert!(Cli::try_parse_from(["dsw", "--seconds", "5"]).is_err());
    }

    #[test]
    fn short_flags_map_to_overrides() {
        let cli = Cli::try_parse_from([
            "dsw", "-p", "/srv/drop", "-s", "30", "-t", "21", "-l", "-c", "-e", "tmp, LOG",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(overrides.root, Some(PathBuf::from("/srv/drop")));
        assert_eq!(overrides.poll_interval_secs, Some(30));
        assert_eq!(overrides.cleanup_hour, Some(21));
        assert!(overrides.logging_enabled);
        assert!(overrides.cleanup_enabled);
        assert_eq!(overrides.exclude.as_deref(), Some("tmp, LOG"));
        assert!(!cli.once);
    }

    #[test]
    fn omitted_values_leave_config_defaults() {
        let cli = Cli::try_parse_from(["dsw", "--path", "/srv/drop", "--once"]).unwrap();
        let mut config = Config::default();
        config.apply_cli(&cli.overrides());
        assert_eq!(config.watch.poll_interval_secs, 15);
        assert_eq!(config.cleanup.hour, 22);
        assert!(!config.logging.enabled);
        assert!(!config.cleanup.enabled);
        assert!(cli.once);
    }

    #[test]
    fn output_mode_resolution_honors_precedence() {
        assert_eq!(
            resolve_output_mode(true, Some("human"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("json"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("human"), false),
            OutputMode::Human
        );
        assert_eq!(resolve_output_mode(false, None, true), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, None, false), OutputMode::Json);
    }
}
