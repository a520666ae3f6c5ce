//! Logging setup for the `datalens` binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the binary, which calls [`init`] once at startup.
//!
//! - **Console**: human-readable events on stderr. Stdout carries the tool
//!   transport and must stay clean.
//! - **Files** (optional): a daily rolling `datalens.log` with every event and
//!   an `error.log` with warnings and errors only.
//! - **Filter**: `info` by default, overridable with `RUST_LOG`.
//!
//! ```no_run
//! use datalens::logging::{self, LogOptions};
//!
//! let _guards = logging::init(&LogOptions::default()).expect("Failed to initialize logging");
//! tracing::info!("datalens started");
//! ```

use anyhow::{Context as _, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

/// Old log files kept per appender.
const MAX_LOG_FILES: usize = 10;

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Also write rolling log files
    pub log_to_file: bool,
    /// Where the files go; the platform data directory when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            default_filter: "info".to_owned(),
            log_to_file: false,
            log_dir: None,
        }
    }
}

/// Gets the log directory path based on platform conventions
///
/// Returns:
/// - Windows: `%APPDATA%/datalens/logs`
/// - macOS: `~/Library/Application Support/datalens/logs`
/// - Linux: `~/.local/share/datalens/logs`
pub fn get_log_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to determine data directory")?;
    Ok(base_dir.join("datalens").join("logs"))
}

fn prepare_dir(dir: PathBuf) -> Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    }
    Ok(dir)
}

/// Install the global subscriber.
///
/// The returned guards flush the file writers when dropped; keep them alive
/// for the lifetime of the process.
///
/// # Errors
///
/// Returns an error if the filter is invalid, the log directory cannot be
/// created, or a subscriber is already installed.
pub fn init(options: &LogOptions) -> Result<Vec<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.default_filter))
        .context("Failed to create env filter")?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    let mut guards = Vec::new();
    let mut file_layers = Vec::new();
    let mut log_dir = None;

    if options.log_to_file {
        let dir = match &options.log_dir {
            Some(dir) => dir.clone(),
            None => get_log_dir()?,
        };
        let dir = prepare_dir(dir)?;

        let all_logs_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .max_log_files(MAX_LOG_FILES)
            .filename_prefix("datalens")
            .filename_suffix("log")
            .build(&dir)
            .context("Failed to create all-logs file appender")?;
        let error_logs_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .max_log_files(MAX_LOG_FILES)
            .filename_prefix("error")
            .filename_suffix("log")
            .build(&dir)
            .context("Failed to create error-logs file appender")?;

        let (all_writer, all_guard) = tracing_appender::non_blocking(all_logs_appender);
        let (error_writer, error_guard) = tracing_appender::non_blocking(error_logs_appender);
        guards.push(all_guard);
        guards.push(error_guard);

        file_layers.push(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_ansi(false)
                .with_writer(all_writer)
                .boxed(),
        );
        file_layers.push(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_ansi(false)
                .with_writer(error_writer)
                .with_filter(EnvFilter::new("warn"))
                .boxed(),
        );
        log_dir = Some(dir);
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    match log_dir {
        Some(dir) => tracing::info!("Logging initialized, log directory: {:?}", dir),
        None => tracing::debug!("Logging initialized (console only)"),
    }
    Ok(guards)
}

/// Gets the path to today's log file in `log_dir`
pub fn current_log_path(log_dir: &std::path::Path) -> PathBuf {
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    log_dir.join(format!("datalens.{today}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_log_dir() -> Result<()> {
        let log_dir = get_log_dir()?;
        assert!(log_dir.ends_with("datalens/logs"));
        Ok(())
    }

    #[test]
    fn test_current_log_path() {
        let path = current_log_path(std::path::Path::new("/tmp/logs"));
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert!(name.starts_with("datalens."));
        assert!(name.ends_with(".log"));
    }

    #[test]
    fn test_prepare_dir_creates_missing_directories() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let nested = tmp.path().join("a").join("b");
        let dir = prepare_dir(nested.clone())?;
        assert!(dir.is_dir());
        assert_eq!(dir, nested);
        Ok(())
    }
}
