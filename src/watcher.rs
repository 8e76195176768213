use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::clipboard::{ClipboardMonitor, ClipboardSource, Formats, SystemClipboard};
use crate::config::{AppPaths, POLL_INTERVAL};
use crate::errors::{ClipError, Result};
use crate::history::{CaptureOutcome, HistoryManager};
use crate::notify::Notifier;
use crate::storage::HistoryStore;
use crate::storage::sqlite::SqliteStorage;

pub fn write_pid_file(path: &Path) -> Result<()> {
    let pid = std::process::id();
    fs::write(path, pid.to_string()).map_err(|e| ClipError::Watcher(e.to_string()))
}

pub fn read_pid_file(path: &Path) -> Result<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(contents) => match contents.trim().parse::<u32>() {
            Ok(pid) => Ok(Some(pid)),
            Err(_) => Ok(None),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ClipError::Watcher(e.to_string())),
    }
}

pub fn remove_pid_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ClipError::Watcher(e.to_string())),
    }
}

pub fn is_process_running(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

/// Pid of the live watcher, clearing a stale pid file if its process is gone.
pub fn watcher_status(paths: &AppPaths) -> Result<Option<u32>> {
    match read_pid_file(&paths.pid_file)? {
        Some(pid) if is_process_running(pid) => Ok(Some(pid)),
        Some(_) => {
            remove_pid_file(&paths.pid_file)?;
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Starts `<current exe> watch` in the background with stderr going to the
/// watcher log.
pub fn spawn_watcher(paths: &AppPaths) -> Result<u32> {
    let exe = std::env::current_exe().map_err(|e| ClipError::Watcher(e.to_string()))?;
    fs::create_dir_all(&paths.base_dir).map_err(|e| ClipError::Watcher(e.to_string()))?;
    let log_file = fs::File::create(&paths.watcher_log_file)
        .map_err(|e| ClipError::Watcher(e.to_string()))?;

    let child = std::process::Command::new(exe)
        .arg("watch")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::from(log_file))
        .spawn()
        .map_err(|e| ClipError::Watcher(e.to_string()))?;

    Ok(child.id())
}

/// Starts a watcher unless one is already recorded as running.
pub fn ensure_watcher(paths: &AppPaths) -> Result<u32> {
    if let Some(pid) = watcher_status(paths)? {
        debug!(pid, "watcher already running");
        return Ok(pid);
    }
    let pid = spawn_watcher(paths)?;
    info!(pid, "started watcher");
    Ok(pid)
}

/// State shared by the capture loop and every capture task it spawns.
pub struct WatcherContext<S: HistoryStore> {
    pub history: HistoryManager<S>,
    pub clipboard: Arc<dyn ClipboardSource>,
}

impl<S: HistoryStore + Send + 'static> WatcherContext<S> {
    pub fn new(history: HistoryManager<S>, clipboard: Arc<dyn ClipboardSource>) -> Arc<Self> {
        Arc::new(Self { history, clipboard })
    }

    /// Handles one change notification on its own thread. Tasks may finish
    /// in any order; the history manager serializes their writes.
    pub fn spawn_capture(self: &Arc<Self>, formats: Formats) -> Result<JoinHandle<CaptureOutcome>> {
        let ctx = Arc::clone(self);
        thread::Builder::new()
            .name("capture".into())
            .spawn(move || {
                let outcome = ctx.history.capture_change(ctx.clipboard.as_ref(), &formats);
                debug!(?outcome, "capture finished");
                outcome
            })
            .map_err(|e| ClipError::Watcher(e.to_string()))
    }

    /// Polls the clipboard until `running` is cleared, then waits for
    /// in-flight captures.
    pub fn run_capture_loop(self: &Arc<Self>, running: &AtomicBool, interval: Duration) {
        let mut monitor = ClipboardMonitor::new();
        let mut in_flight: Vec<JoinHandle<CaptureOutcome>> = Vec::new();

        while running.load(Ordering::Relaxed) {
            match monitor.poll(self.clipboard.as_ref()) {
                Ok(Some(formats)) => match self.spawn_capture(formats) {
                    Ok(handle) => in_flight.push(handle),
                    Err(e) => warn!(error = %e, "could not start capture"),
                },
                Ok(None) => {}
                Err(e) => debug!(error = %e, "clipboard poll failed"),
            }
            reap_finished(&mut in_flight);
            thread::sleep(interval);
        }

        for handle in in_flight {
            join_capture(handle);
        }
    }
}

fn join_capture(handle: JoinHandle<CaptureOutcome>) -> Option<CaptureOutcome> {
    match handle.join() {
        Ok(outcome) => Some(outcome),
        Err(_) => {
            warn!("capture task panicked");
            None
        }
    }
}

/// Joins every finished capture so a panicked one is logged, keeping the rest.
fn reap_finished(in_flight: &mut Vec<JoinHandle<CaptureOutcome>>) {
    let (done, pending): (Vec<_>, Vec<_>) = in_flight.drain(..).partition(|h| h.is_finished());
    *in_flight = pending;
    for handle in done {
        join_capture(handle);
    }
}

pub fn run_watcher(paths: &AppPaths) -> Result<()> {
    fs::create_dir_all(&paths.base_dir).map_err(|e| ClipError::Watcher(e.to_string()))?;

    if let Some(pid) = watcher_status(paths)?
        && pid != std::process::id()
    {
        return Err(ClipError::Watcher(format!("already running (pid {})", pid)));
    }

    let storage = SqliteStorage::open(&paths.db_path)?;
    let history = HistoryManager::new(storage)
        .with_signal(Box::new(Notifier::new(&paths.socket_path)));
    if let Err(e) = history.compact() {
        warn!(error = %e, "startup compaction failed");
    }
    history.prime_from_store()?;

    // Only claim the pid file once nothing before the loop can bail out.
    write_pid_file(&paths.pid_file)?;
    let ctx = WatcherContext::new(history, Arc::new(SystemClipboard::new()));

    let running = Arc::new(AtomicBool::new(true));
    shutdown_handler(Arc::clone(&running));

    info!(pid = std::process::id(), db = %paths.db_path.display(), "watching clipboard");
    ctx.run_capture_loop(&running, POLL_INTERVAL);

    info!("shutting down");
    if let Err(e) = ctx.history.compact() {
        error!(error = %e, "shutdown compaction failed");
    }
    remove_pid_file(&paths.pid_file)?;
    Ok(())
}

fn shutdown_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::Relaxed);
    }) {
        warn!(error = %e, "could not install shutdown handler");
    }
}
