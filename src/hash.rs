use sha2::{Digest, Sha256};

/// Fingerprint of the clipboard's current payload. Text and image payloads
/// are hashed under different tags so identical bytes never collide across
/// kinds.
pub fn clipboard_fingerprint(kind_tag: &str, data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind_tag.as_bytes());
    hasher.update([0u8]);
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_deterministic() {
        assert_eq!(
            clipboard_fingerprint("text", b"hello"),
            clipboard_fingerprint("text", b"hello")
        );
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let h = clipboard_fingerprint("text", b"hello");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_separates_kinds() {
        let text = clipboard_fingerprint("text", b"same bytes");
        let image = clipboard_fingerprint("image", b"same bytes");
        assert_ne!(text, image);
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        assert_ne!(
            clipboard_fingerprint("text", b"a"),
            clipboard_fingerprint("text", b"b")
        );
    }
}
