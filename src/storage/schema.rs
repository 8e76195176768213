pub const CREATE_HISTORY_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind INTEGER NOT NULL DEFAULT 1,
        captured_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        content TEXT NOT NULL
    )
";

pub const CREATE_INDEX_KIND_CONTENT: &str =
    "CREATE INDEX IF NOT EXISTS idx_history_kind_content ON history(kind, content)";

pub const CREATE_INDEX_CONTENT_CAPTURED_AT: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_history_content_captured_at ON history(content, captured_at)";
