use chrono::{DateTime, Utc};

/// Kind of a stored history row. The integer codes are what the `kind`
/// column holds on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Image,
}

impl ContentKind {
    pub fn code(&self) -> i64 {
        match self {
            ContentKind::Text => 1,
            ContentKind::Image => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<ContentKind> {
        match code {
            1 => Some(ContentKind::Text),
            2 => Some(ContentKind::Image),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
        }
    }
}

/// A persisted history entry. `content` is the trimmed text for
/// [`ContentKind::Text`] rows and a base64-encoded PNG for
/// [`ContentKind::Image`] rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipboardItem {
    pub id: i64,
    pub kind: ContentKind,
    pub content: String,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HistoryFilter {
    #[default]
    All,
    /// Text rows whose content contains the substring (case-sensitive).
    Text(String),
}

impl HistoryFilter {
    /// Maps a search box value onto a filter; an empty query means no filter.
    pub fn from_search(query: &str) -> HistoryFilter {
        if query.is_empty() {
            HistoryFilter::All
        } else {
            HistoryFilter::Text(query.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_round_trip() {
        assert_eq!(ContentKind::from_code(ContentKind::Text.code()), Some(ContentKind::Text));
        assert_eq!(ContentKind::from_code(ContentKind::Image.code()), Some(ContentKind::Image));
        assert_eq!(ContentKind::from_code(7), None);
    }

    #[test]
    fn test_filter_from_empty_search_is_all() {
        assert_eq!(HistoryFilter::from_search(""), HistoryFilter::All);
    }

    #[test]
    fn test_filter_from_search_keeps_case() {
        assert_eq!(
            HistoryFilter::from_search("Hello"),
            HistoryFilter::Text("Hello".to_string())
        );
    }
}
