pub mod models;
pub mod schema;
pub mod sqlite;

use crate::errors::Result;
use models::{ClipboardItem, ContentKind, HistoryFilter};

pub trait HistoryStore {
    /// Appends a row stamped with the current time. Inserting an image
    /// replaces any image row already present.
    fn insert(&self, kind: ContentKind, content: &str) -> Result<i64>;
    fn get_by_id(&self, id: i64) -> Result<ClipboardItem>;
    /// Rows matching `filter`, most recently captured first.
    fn query(&self, filter: &HistoryFilter, limit: i64) -> Result<Vec<ClipboardItem>>;
    fn latest(&self) -> Result<Option<ClipboardItem>>;
    fn count(&self) -> Result<i64>;
    fn touch(&self, id: i64) -> Result<bool>;
    fn remove(&self, id: i64) -> Result<bool>;
    fn compact(&self) -> Result<()>;
}
