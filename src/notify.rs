//! One-byte "history changed" signal between the watcher and the viewer.
//!
//! The viewer binds a Unix socket and the watcher connects once per
//! stored capture, writes a byte and hangs up. Nothing is queued: a signal
//! sent while no viewer is listening is simply lost.

use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::errors::{ClipError, Result};

const SIGNAL_BYTE: u8 = b'1';

/// Something to poke after the history changed.
pub trait ChangeSignal: Send + Sync {
    fn signal(&self);
}

pub struct Notifier {
    socket_path: PathBuf,
}

impl Notifier {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn try_signal(&self) -> Result<()> {
        let mut stream =
            UnixStream::connect(&self.socket_path).map_err(ClipError::NotifyUnreachable)?;
        stream
            .write_all(&[SIGNAL_BYTE])
            .map_err(ClipError::NotifyUnreachable)
    }
}

impl ChangeSignal for Notifier {
    fn signal(&self) {
        if let Err(e) = self.try_signal() {
            debug!(error = %e, "no listener for change signal");
        }
    }
}

pub struct NotifyListener {
    listener: UnixListener,
    path: PathBuf,
}

impl NotifyListener {
    /// Replaces any stale socket file at `path` and starts listening.
    pub fn bind(path: &Path) -> Result<Self> {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ClipError::Watcher(format!("{}: {}", path.display(), e))),
        }
        let listener = UnixListener::bind(path)
            .map_err(|e| ClipError::Watcher(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks for the next connection and reads its single byte. Returns
    /// `false` when the peer hung up without sending anything.
    pub fn accept_one(&self) -> io::Result<bool> {
        let (mut stream, _) = self.listener.accept()?;
        let mut buf = [0u8; 1];
        let read = stream.read(&mut buf)?;
        Ok(read == 1)
    }

    /// Accepts connections until `on_change` returns `false`.
    pub fn listen<F>(&self, mut on_change: F)
    where
        F: FnMut() -> bool,
    {
        loop {
            match self.accept_one() {
                Ok(true) => {
                    if !on_change() {
                        break;
                    }
                }
                Ok(false) => debug!("connection closed without a signal byte"),
                Err(e) => warn!(error = %e, "failed to read change signal"),
            }
        }
    }
}

impl Drop for NotifyListener {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Runs a listener on its own thread, forwarding each signal to `tx`.
/// The thread exits once the receiving side is dropped and one more signal
/// arrives.
pub fn spawn_listener(path: &Path, tx: Sender<()>) -> Result<JoinHandle<()>> {
    let listener = NotifyListener::bind(path)?;
    info!(path = %listener.path().display(), "listening for change signals");
    thread::Builder::new()
        .name("notify-listener".into())
        .spawn(move || listener.listen(|| tx.send(()).is_ok()))
        .map_err(|e| ClipError::Watcher(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn test_signal_without_listener_is_unreachable() {
        let dir = TempDir::new().unwrap();
        let notifier = Notifier::new(dir.path().join("absent.sock"));
        assert!(matches!(
            notifier.try_signal(),
            Err(ClipError::NotifyUnreachable(_))
        ));
        notifier.signal();
    }

    #[test]
    fn test_listener_receives_signal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.sock");
        let (tx, rx) = mpsc::channel();
        spawn_listener(&path, tx).unwrap();

        Notifier::new(&path).signal();
        assert!(rx.recv_timeout(WAIT).is_ok());
    }

    #[test]
    fn test_each_signal_is_delivered() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.sock");
        let (tx, rx) = mpsc::channel();
        spawn_listener(&path, tx).unwrap();

        let notifier = Notifier::new(&path);
        for _ in 0..3 {
            notifier.try_signal().unwrap();
        }
        for _ in 0..3 {
            assert!(rx.recv_timeout(WAIT).is_ok());
        }
    }

    #[test]
    fn test_bind_replaces_stale_socket_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.sock");
        fs::write(&path, "stale").unwrap();
        let listener = NotifyListener::bind(&path).unwrap();
        assert_eq!(listener.path(), path.as_path());
    }

    #[test]
    fn test_accept_one_without_byte() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.sock");
        let listener = NotifyListener::bind(&path).unwrap();
        drop(UnixStream::connect(&path).unwrap());
        assert!(!listener.accept_one().unwrap());
    }

    #[test]
    fn test_signals_before_bind_are_not_queued() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.sock");
        let notifier = Notifier::new(&path);
        for _ in 0..5 {
            notifier.signal();
        }

        let (tx, rx) = mpsc::channel();
        spawn_listener(&path, tx).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_drop_removes_socket_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.sock");
        let listener = NotifyListener::bind(&path).unwrap();
        assert!(path.exists());
        drop(listener);
        assert!(!path.exists());
    }
}
