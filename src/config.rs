use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{ClipError, Result};

/// Maximum number of rows returned by a history query.
pub const QUERY_LIMIT: i64 = 50;

/// How often the watcher samples the clipboard for changes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub const APP_DIR_NAME: &str = "clipwatch";
pub const SOCKET_FILE_NAME: &str = "clipwatch.sock";

pub struct AppPaths {
    pub base_dir: PathBuf,
    pub db_path: PathBuf,
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    pub watcher_log_file: PathBuf,
    pub socket_path: PathBuf,
}

impl AppPaths {
    /// Resolves paths under the per-user data directory
    /// (`~/.local/share/clipwatch` on Linux, `~/Library/Application Support/clipwatch` on macOS).
    pub fn new() -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| {
                ClipError::StoreUnavailable("could not determine user data directory".into())
            })?
            .join(APP_DIR_NAME);
        Ok(Self::from_base(base))
    }

    pub fn from_base(base: PathBuf) -> Self {
        Self {
            db_path: base.join("clipwatch.db"),
            pid_file: base.join("watcher.pid"),
            log_file: base.join("clipwatch.log"),
            watcher_log_file: base.join("watcher.log"),
            socket_path: std::env::temp_dir().join(SOCKET_FILE_NAME),
            base_dir: base,
        }
    }
}
