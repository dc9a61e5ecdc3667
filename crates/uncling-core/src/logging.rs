//! File logging.
//!
//! Logs go to `<UNCLING_HOME>/logs/uncling.log` so they never mix with
//! command output. The filter comes from `UNCLING_LOG` (default `info`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "UNCLING_LOG";
pub const LOG_FILE: &str = "uncling.log";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Keep the guard alive until exit so
/// buffered lines are flushed.
///
/// # Errors
/// Returns an error if the log directory cannot be created.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    // A subscriber may already be installed (tests, embedding); that is fine.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_ansi(false)
        .with_writer(writer)
        .try_init();

    Ok(guard)
}
