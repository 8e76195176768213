//! tracing setup for the two process roles.
//!
//! The watcher logs to stderr, which `spawn_watcher` points at the watcher
//! log. The viewer owns the terminal, so it logs to a file through a
//! non-blocking appender. Both honour `CLIPWATCH_LOG` (an `EnvFilter`
//! directive, default `info`).

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::errors::{ClipError, Result};

pub const LOG_ENV: &str = "CLIPWATCH_LOG";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .try_init();
}

/// Logs to the file at `path`. Keep the guard alive until exit or buffered
/// lines are lost.
pub fn init_file(path: &Path) -> Result<WorkerGuard> {
    let (Some(dir), Some(file_name)) = (path.parent(), path.file_name()) else {
        return Err(ClipError::Watcher(format!("bad log path {}", path.display())));
    };
    std::fs::create_dir_all(dir).map_err(|e| ClipError::Watcher(e.to_string()))?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    Ok(guard)
}
