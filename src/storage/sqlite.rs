use std::fs;
use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use super::HistoryStore;
use super::models::{ClipboardItem, ContentKind, HistoryFilter};
use super::schema;
use crate::errors::{ClipError, Result};

const BASE_SELECT: &str = "SELECT id, kind, captured_at, content FROM history";

/// Recency order. `id` breaks ties between rows stamped in the same instant.
const ORDER_RECENT: &str = "ORDER BY captured_at DESC, id DESC";

pub struct SqliteStorage {
    conn: Connection,
}

fn row_to_item(row: &Row) -> rusqlite::Result<ClipboardItem> {
    let kind_code: i64 = row.get(1)?;
    Ok(ClipboardItem {
        id: row.get(0)?,
        kind: ContentKind::from_code(kind_code).unwrap_or(ContentKind::Text),
        captured_at: row.get(2)?,
        content: row.get(3)?,
    })
}

/// Fixed-width UTC stamp so that lexical order in the `captured_at`
/// column matches chronological order.
fn timestamp_now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

impl SqliteStorage {
    /// Opens (creating if needed) the history database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ClipError::StoreUnavailable(format!("{}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| ClipError::StoreUnavailable(format!("{}: {}", path.display(), e)))?;
        Self::new(conn)
            .map_err(|e| ClipError::StoreUnavailable(format!("{}: {}", path.display(), e)))
    }

    pub fn new(conn: Connection) -> Result<Self> {
        // Readers in the presentation process must not block the watcher's writes.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute(schema::CREATE_HISTORY_TABLE, [])?;
        conn.execute(schema::CREATE_INDEX_KIND_CONTENT, [])?;
        conn.execute(schema::CREATE_INDEX_CONTENT_CAPTURED_AT, [])?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::new(conn)
    }

    #[cfg(test)]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn insert_row(&self, kind: ContentKind, content: &str) -> rusqlite::Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        if kind == ContentKind::Image {
            tx.execute(
                "DELETE FROM history WHERE kind = ?",
                params![ContentKind::Image.code()],
            )?;
        }
        tx.execute(
            "INSERT INTO history (kind, captured_at, content) VALUES (?, ?, ?)",
            params![kind.code(), timestamp_now(), content],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }
}

impl HistoryStore for SqliteStorage {
    fn insert(&self, kind: ContentKind, content: &str) -> Result<i64> {
        self.insert_row(kind, content).map_err(ClipError::WriteFailed)
    }

    fn get_by_id(&self, id: i64) -> Result<ClipboardItem> {
        let sql = format!("{} WHERE id = ?", BASE_SELECT);
        self.conn
            .query_row(&sql, params![id], row_to_item)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    ClipError::NotFound(format!("History item with id {} not found", id))
                }
                other => ClipError::Storage(other),
            })
    }

    fn query(&self, filter: &HistoryFilter, limit: i64) -> Result<Vec<ClipboardItem>> {
        match filter {
            HistoryFilter::All => {
                let sql = format!("{} {} LIMIT ?", BASE_SELECT, ORDER_RECENT);
                let mut stmt = self.conn.prepare(&sql)?;
                let items = stmt
                    .query_map(params![limit], row_to_item)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            }
            HistoryFilter::Text(needle) => {
                // instr() keeps the match case-sensitive, unlike LIKE.
                let sql = format!(
                    "{} WHERE kind = ? AND instr(content, ?) > 0 {} LIMIT ?",
                    BASE_SELECT, ORDER_RECENT
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let items = stmt
                    .query_map(params![ContentKind::Text.code(), needle, limit], row_to_item)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            }
        }
    }

    fn latest(&self) -> Result<Option<ClipboardItem>> {
        let sql = format!("{} {} LIMIT 1", BASE_SELECT, ORDER_RECENT);
        match self.conn.query_row(&sql, [], row_to_item) {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ClipError::Storage(e)),
        }
    }

    fn count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
            .map_err(ClipError::Storage)
    }

    fn touch(&self, id: i64) -> Result<bool> {
        let changes = self.conn.execute(
            "UPDATE history SET captured_at = ? WHERE id = ?",
            params![timestamp_now(), id],
        )?;
        Ok(changes > 0)
    }

    fn remove(&self, id: i64) -> Result<bool> {
        let changes = self
            .conn
            .execute("DELETE FROM history WHERE id = ?", params![id])?;
        Ok(changes > 0)
    }

    fn compact(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM;")?;
        Ok(())
    }
}
