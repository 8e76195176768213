use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::clipboard::{self, ClipboardSource, Formats};
use crate::config::QUERY_LIMIT;
use crate::errors::Result;
use crate::notify::ChangeSignal;
use crate::storage::HistoryStore;
use crate::storage::models::{ClipboardItem, ContentKind, HistoryFilter};

/// Where a single capture attempt ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Never reached the dedup gate.
    Discarded(DiscardReason),
    /// Rejected at or after the dedup gate.
    Dropped(DropReason),
    Persisted(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    UnsupportedFormat,
    EmptyPayload,
    ExtractionFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Empty,
    SameAsRecent,
    WriteFailed,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Dedup, persistence and copy-back policy on top of a [`HistoryStore`].
///
/// `capture` holds the recent-content lock across the store write, so
/// concurrent captures are serialized and the dedup check always sees the
/// last stored value.
pub struct HistoryManager<S: HistoryStore> {
    store: Mutex<S>,
    recent_content: Mutex<String>,
    search_filter: Mutex<HistoryFilter>,
    item_count: AtomicI64,
    signal: Option<Box<dyn ChangeSignal>>,
}

impl<S: HistoryStore> HistoryManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Mutex::new(store),
            recent_content: Mutex::new(String::new()),
            search_filter: Mutex::new(HistoryFilter::All),
            item_count: AtomicI64::new(0),
            signal: None,
        }
    }

    /// Fires `signal` after every persisted capture.
    pub fn with_signal(mut self, signal: Box<dyn ChangeSignal>) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Seeds the dedup cache with the newest stored row so whatever is on
    /// the clipboard at boot is not stored a second time.
    pub fn prime_from_store(&self) -> Result<()> {
        let latest = lock(&self.store).latest()?;
        let content = latest.map(|item| item.content).unwrap_or_default();
        debug!(len = content.len(), "primed recent content");
        *lock(&self.recent_content) = content;
        Ok(())
    }

    pub fn recent_content(&self) -> String {
        lock(&self.recent_content).clone()
    }

    pub fn set_search_filter(&self, query: &str) {
        *lock(&self.search_filter) = HistoryFilter::from_search(query);
    }

    pub fn search_filter(&self) -> HistoryFilter {
        lock(&self.search_filter).clone()
    }

    /// The current view under the active search filter, newest first.
    pub fn items(&self, update_count: bool) -> Result<Vec<ClipboardItem>> {
        let filter = self.search_filter();
        let items = lock(&self.store).query(&filter, QUERY_LIMIT)?;
        if update_count && let Err(e) = self.count() {
            warn!(error = %e, "count refresh failed");
        }
        Ok(items)
    }

    /// Refreshes and returns the total row count.
    pub fn count(&self) -> Result<i64> {
        let total = lock(&self.store).count()?;
        self.item_count.store(total, Ordering::Relaxed);
        Ok(total)
    }

    /// Total row count as of the last refresh.
    pub fn total_count(&self) -> i64 {
        self.item_count.load(Ordering::Relaxed)
    }

    /// The dedup gate. Content equal to the last stored value is dropped;
    /// anything else is written, cached and signalled.
    pub fn capture(&self, kind: ContentKind, content: &str) -> CaptureOutcome {
        if content.is_empty() {
            return CaptureOutcome::Dropped(DropReason::Empty);
        }

        let mut recent = lock(&self.recent_content);
        if *recent == content {
            debug!(kind = kind.as_str(), "capture matches recent content");
            return CaptureOutcome::Dropped(DropReason::SameAsRecent);
        }

        let inserted = lock(&self.store).insert(kind, content);
        match inserted {
            Ok(id) => {
                *recent = content.to_string();
                drop(recent);
                info!(id, kind = kind.as_str(), len = content.len(), "stored capture");
                if let Some(signal) = &self.signal {
                    signal.signal();
                }
                CaptureOutcome::Persisted(id)
            }
            Err(e) => {
                warn!(error = %e, kind = kind.as_str(), "dropping capture");
                CaptureOutcome::Dropped(DropReason::WriteFailed)
            }
        }
    }

    /// Runs one clipboard change through classify, read and dedup.
    pub fn capture_change(
        &self,
        source: &dyn ClipboardSource,
        formats: &Formats,
    ) -> CaptureOutcome {
        let Some(kind) = clipboard::classify(formats) else {
            info!(formats = %formats, "unsupported clipboard format");
            return CaptureOutcome::Discarded(DiscardReason::UnsupportedFormat);
        };

        match clipboard::extract(source, kind) {
            Ok(Some(content)) => self.capture(kind, &content),
            Ok(None) => CaptureOutcome::Discarded(DiscardReason::EmptyPayload),
            Err(e) => {
                debug!(error = %e, kind = kind.as_str(), "discarding capture");
                CaptureOutcome::Discarded(DiscardReason::ExtractionFailed)
            }
        }
    }

    /// Puts a stored row back on the clipboard and promotes it to most
    /// recent. The promotion is skipped when the clipboard write fails.
    pub fn copy_back(&self, id: i64, target: &dyn ClipboardSource) -> Result<()> {
        let item = lock(&self.store).get_by_id(id)?;

        let written = match item.kind {
            ContentKind::Text => target.write_text(&item.content),
            ContentKind::Image => {
                clipboard::decode_png_base64(&item.content).and_then(|img| target.write_image(img))
            }
        };
        if let Err(e) = written {
            warn!(id, error = %e, "copy-back failed");
            return Err(e);
        }

        lock(&self.store).touch(id)?;
        debug!(id, kind = item.kind.as_str(), "copied back");
        Ok(())
    }

    /// Removes a row. The peer process is not signalled.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let removed = lock(&self.store).remove(id)?;
        if removed {
            debug!(id, "deleted history item");
        }
        Ok(removed)
    }

    pub fn compact(&self) -> Result<()> {
        lock(&self.store).compact()
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> MutexGuard<'_, S> {
        lock(&self.store)
    }
}
