use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Write failed: {0}")]
    WriteFailed(rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Notifier unreachable: {0}")]
    NotifyUnreachable(#[source] std::io::Error),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, ClipError>;
