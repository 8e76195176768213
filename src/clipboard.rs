use std::borrow::Cow;
use std::io::Cursor;
use std::sync::{Mutex, PoisonError};

use arboard::Clipboard;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use image::ImageEncoder;
use tracing::{debug, info};

use crate::errors::{ClipError, Result};
use crate::hash::clipboard_fingerprint;
use crate::storage::models::ContentKind;

pub const TEXT_FORMAT: &str = "text/plain;charset=utf-8";
pub const PNG_FORMAT: &str = "image/png";

/// The set of formats the clipboard currently advertises, as MIME-like names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Formats(pub Vec<String>);

impl Formats {
    pub fn new<I, S>(formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Formats(formats.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_text(&self) -> bool {
        self.0.iter().any(|f| f.starts_with("text/"))
    }

    pub fn has_image(&self) -> bool {
        self.0.iter().any(|f| f.starts_with("image/"))
    }
}

impl std::fmt::Display for Formats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

/// Uncompressed RGBA8 bitmap, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: usize,
    pub height: usize,
    pub bytes: Vec<u8>,
}

/// Access to a clipboard. Implemented over the OS clipboard by
/// [`SystemClipboard`]; tests substitute an in-memory one.
pub trait ClipboardSource: Send + Sync {
    fn formats(&self) -> Result<Formats>;
    fn read_text(&self) -> Result<String>;
    fn read_image(&self) -> Result<RawImage>;
    fn write_text(&self, text: &str) -> Result<()>;
    fn write_image(&self, image: RawImage) -> Result<()>;
    /// Fingerprint of the current payload, `None` when the clipboard holds
    /// nothing readable.
    fn fingerprint(&self) -> Result<Option<String>>;
}

/// Text takes precedence over images when both are advertised.
pub fn classify(formats: &Formats) -> Option<ContentKind> {
    if formats.has_text() {
        Some(ContentKind::Text)
    } else if formats.has_image() {
        Some(ContentKind::Image)
    } else {
        None
    }
}

/// Reads the payload for `kind` and returns its canonical stored form, or
/// `None` if the payload turns out to be empty.
pub fn extract(source: &dyn ClipboardSource, kind: ContentKind) -> Result<Option<String>> {
    match kind {
        ContentKind::Text => {
            let text = source
                .read_text()
                .map_err(|e| ClipError::ExtractionFailed(e.to_string()))?;
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        ContentKind::Image => {
            let image = source
                .read_image()
                .map_err(|e| ClipError::ExtractionFailed(e.to_string()))?;
            let encoded = encode_png_base64(&image)
                .map_err(|e| ClipError::ExtractionFailed(e.to_string()))?;
            if encoded.is_empty() {
                Ok(None)
            } else {
                Ok(Some(encoded))
            }
        }
    }
}

pub fn encode_png(image: &RawImage) -> Result<Vec<u8>> {
    if image.width == 0 || image.height == 0 {
        return Ok(Vec::new());
    }
    let expected = image.width * image.height * 4;
    if image.bytes.len() != expected {
        return Err(ClipError::Image(format!(
            "bitmap is {} bytes, expected {} for {}x{} RGBA",
            image.bytes.len(),
            expected,
            image.width,
            image.height
        )));
    }
    let mut png = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(Cursor::new(&mut png));
    encoder
        .write_image(
            &image.bytes,
            image.width as u32,
            image.height as u32,
            image::ColorType::Rgba8.into(),
        )
        .map_err(|e| ClipError::Image(e.to_string()))?;
    Ok(png)
}

/// PNG-encodes the bitmap and base64-encodes the PNG bytes. A zero-sized
/// bitmap yields an empty string.
pub fn encode_png_base64(image: &RawImage) -> Result<String> {
    let png = encode_png(image)?;
    if png.is_empty() {
        return Ok(String::new());
    }
    Ok(BASE64.encode(png))
}

pub fn decode_png_base64(content: &str) -> Result<RawImage> {
    let png = BASE64
        .decode(content)
        .map_err(|e| ClipError::Image(format!("invalid base64: {e}")))?;
    let decoded = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
        .map_err(|e| ClipError::Image(e.to_string()))?;
    let rgba = decoded.to_rgba8();
    let (w, h) = rgba.dimensions();
    Ok(RawImage {
        width: w as usize,
        height: h as usize,
        bytes: rgba.into_raw(),
    })
}

/// Width and height of a stored image row without keeping the pixels.
pub fn image_dimensions(content: &str) -> Option<(usize, usize)> {
    decode_png_base64(content)
        .ok()
        .map(|img| (img.width, img.height))
}

/// Runs `f` against the handle in `slot`, opening it first if needed. The
/// handle stays in the slot afterwards; a failed open leaves it empty so the
/// next call retries.
fn with_handle<H, T>(
    slot: &Mutex<Option<H>>,
    open: impl FnOnce() -> Result<H>,
    f: impl FnOnce(&mut H) -> Result<T>,
) -> Result<T> {
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    let handle = match guard.take() {
        Some(handle) => handle,
        None => open()?,
    };
    f(guard.insert(handle))
}

/// The OS clipboard, via arboard.
///
/// One handle is kept for the life of the process. On X11 the selection is
/// served by that handle, so data written by `write_text`/`write_image` stays
/// pasteable only while it is alive.
#[derive(Default)]
pub struct SystemClipboard {
    handle: Mutex<Option<Clipboard>>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Clipboard) -> Result<T>) -> Result<T> {
        with_handle(
            &self.handle,
            || {
                debug!("opening system clipboard");
                Clipboard::new().map_err(|e| ClipError::Clipboard(e.to_string()))
            },
            f,
        )
    }
}

impl ClipboardSource for SystemClipboard {
    fn formats(&self) -> Result<Formats> {
        self.with(|cb| {
            let mut formats = Vec::new();
            if cb.get_text().is_ok() {
                formats.push(TEXT_FORMAT.to_string());
            }
            if cb.get_image().is_ok() {
                formats.push(PNG_FORMAT.to_string());
            }
            Ok(Formats(formats))
        })
    }

    fn read_text(&self) -> Result<String> {
        self.with(|cb| cb.get_text().map_err(|e| ClipError::Clipboard(e.to_string())))
    }

    fn read_image(&self) -> Result<RawImage> {
        self.with(|cb| {
            let img = cb
                .get_image()
                .map_err(|e| ClipError::Clipboard(e.to_string()))?;
            Ok(RawImage {
                width: img.width,
                height: img.height,
                bytes: img.bytes.into_owned(),
            })
        })
    }

    fn write_text(&self, text: &str) -> Result<()> {
        self.with(|cb| {
            cb.set_text(text)
                .map_err(|e| ClipError::Clipboard(e.to_string()))
        })
    }

    fn write_image(&self, image: RawImage) -> Result<()> {
        self.with(|cb| {
            let data = arboard::ImageData {
                width: image.width,
                height: image.height,
                bytes: Cow::Owned(image.bytes),
            };
            cb.set_image(data)
                .map_err(|e| ClipError::Clipboard(e.to_string()))
        })
    }

    fn fingerprint(&self) -> Result<Option<String>> {
        self.with(|cb| {
            if let Ok(text) = cb.get_text() {
                return Ok(Some(clipboard_fingerprint("text", text.as_bytes())));
            }
            if let Ok(img) = cb.get_image() {
                return Ok(Some(clipboard_fingerprint("image", &img.bytes)));
            }
            Ok(None)
        })
    }
}

/// Turns periodic fingerprint samples into change notifications. The first
/// sample only records the boot-time contents.
#[derive(Debug, Default)]
pub struct ClipboardMonitor {
    last: Option<Option<String>>,
}

impl ClipboardMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the advertised formats when the clipboard changed since the
    /// previous poll.
    pub fn poll(&mut self, source: &dyn ClipboardSource) -> Result<Option<Formats>> {
        let current = source.fingerprint()?;
        let Some(previous) = self.last.replace(current.clone()) else {
            info!("clipboard monitor primed");
            return Ok(None);
        };
        if previous == current || current.is_none() {
            return Ok(None);
        }
        let formats = source.formats()?;
        debug!(formats = %formats, "clipboard changed");
        if formats.is_empty() {
            return Ok(None);
        }
        Ok(Some(formats))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Payload {
        Empty,
        Text(String),
        Image(RawImage),
        Opaque,
    }

    /// In-memory clipboard for pipeline tests.
    #[derive(Debug)]
    pub struct FakeClipboard {
        pub payload: Mutex<Payload>,
        pub fail_reads: Mutex<bool>,
    }

    impl FakeClipboard {
        pub fn new() -> Self {
            Self {
                payload: Mutex::new(Payload::Empty),
                fail_reads: Mutex::new(false),
            }
        }

        pub fn set(&self, payload: Payload) {
            *self.payload.lock().unwrap() = payload;
        }

        pub fn current(&self) -> Payload {
            self.payload.lock().unwrap().clone()
        }

        fn check_readable(&self) -> Result<()> {
            if *self.fail_reads.lock().unwrap() {
                Err(ClipError::Clipboard("read refused".into()))
            } else {
                Ok(())
            }
        }
    }

    impl ClipboardSource for FakeClipboard {
        fn formats(&self) -> Result<Formats> {
            Ok(match self.current() {
                Payload::Empty => Formats::default(),
                Payload::Text(_) => Formats::new([TEXT_FORMAT]),
                Payload::Image(_) => Formats::new([PNG_FORMAT]),
                Payload::Opaque => Formats::new(["application/x-opaque"]),
            })
        }

        fn read_text(&self) -> Result<String> {
            self.check_readable()?;
            match self.current() {
                Payload::Text(text) => Ok(text),
                _ => Err(ClipError::Clipboard("no text".into())),
            }
        }

        fn read_image(&self) -> Result<RawImage> {
            self.check_readable()?;
            match self.current() {
                Payload::Image(image) => Ok(image),
                _ => Err(ClipError::Clipboard("no image".into())),
            }
        }

        fn write_text(&self, text: &str) -> Result<()> {
            self.set(Payload::Text(text.to_string()));
            Ok(())
        }

        fn write_image(&self, image: RawImage) -> Result<()> {
            self.set(Payload::Image(image));
            Ok(())
        }

        fn fingerprint(&self) -> Result<Option<String>> {
            Ok(match self.current() {
                Payload::Empty => None,
                Payload::Text(text) => Some(clipboard_fingerprint("text", text.as_bytes())),
                Payload::Image(image) => Some(clipboard_fingerprint("image", &image.bytes)),
                Payload::Opaque => Some(clipboard_fingerprint("opaque", b"")),
            })
        }
    }

    pub fn solid_image(width: usize, height: usize, value: u8) -> RawImage {
        RawImage {
            width,
            height,
            bytes: vec![value; width * height * 4],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeClipboard, Payload, solid_image};
    use super::*;

    // --- Classification ---

    #[test]
    fn test_classify_text() {
        let formats = Formats::new(["text/plain", "UTF8_STRING"]);
        assert_eq!(classify(&formats), Some(ContentKind::Text));
    }

    #[test]
    fn test_classify_prefers_text_over_image() {
        let formats = Formats::new(["image/png", "text/html"]);
        assert_eq!(classify(&formats), Some(ContentKind::Text));
    }

    #[test]
    fn test_classify_image() {
        let formats = Formats::new(["image/png"]);
        assert_eq!(classify(&formats), Some(ContentKind::Image));
    }

    #[test]
    fn test_classify_unsupported() {
        let formats = Formats::new(["application/x-gtk-text-buffer-rich-text"]);
        assert_eq!(classify(&formats), None);
        assert_eq!(classify(&Formats::default()), None);
    }

    // --- Text extraction ---

    #[test]
    fn test_extract_text_trims() {
        let cb = FakeClipboard::new();
        cb.set(Payload::Text("  hello\n".into()));
        let content = extract(&cb, ContentKind::Text).unwrap();
        assert_eq!(content.as_deref(), Some("hello"));
    }

    #[test]
    fn test_extract_whitespace_only_text_is_discarded() {
        let cb = FakeClipboard::new();
        cb.set(Payload::Text(" \t\n ".into()));
        assert_eq!(extract(&cb, ContentKind::Text).unwrap(), None);
    }

    #[test]
    fn test_extract_read_failure() {
        let cb = FakeClipboard::new();
        cb.set(Payload::Text("hello".into()));
        *cb.fail_reads.lock().unwrap() = true;
        let result = extract(&cb, ContentKind::Text);
        assert!(matches!(result, Err(ClipError::ExtractionFailed(_))));
    }

    // --- Image extraction ---

    #[test]
    fn test_extract_image_is_base64_png() {
        let cb = FakeClipboard::new();
        cb.set(Payload::Image(solid_image(3, 2, 200)));
        let content = extract(&cb, ContentKind::Image).unwrap().unwrap();
        let png = BASE64.decode(&content).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_extract_zero_sized_image_is_discarded() {
        let cb = FakeClipboard::new();
        cb.set(Payload::Image(RawImage {
            width: 0,
            height: 0,
            bytes: Vec::new(),
        }));
        assert_eq!(extract(&cb, ContentKind::Image).unwrap(), None);
    }

    #[test]
    fn test_extract_malformed_bitmap_fails() {
        let cb = FakeClipboard::new();
        cb.set(Payload::Image(RawImage {
            width: 4,
            height: 4,
            bytes: vec![0; 3],
        }));
        let result = extract(&cb, ContentKind::Image);
        assert!(matches!(result, Err(ClipError::ExtractionFailed(_))));
    }

    #[test]
    fn test_decode_restores_bitmap() {
        let original = solid_image(4, 3, 17);
        let encoded = encode_png_base64(&original).unwrap();
        let decoded = decode_png_base64(&encoded).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(image_dimensions(&encoded), Some((4, 3)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_png_base64("%%%"), Err(ClipError::Image(_))));
        let not_png = BASE64.encode(b"plain bytes");
        assert!(matches!(decode_png_base64(&not_png), Err(ClipError::Image(_))));
    }

    // --- System clipboard handle ---

    #[test]
    fn test_handle_opened_once_and_kept() {
        let slot = Mutex::new(None);
        let mut opens = 0;
        for n in 0..3 {
            let seen = with_handle(
                &slot,
                || {
                    opens += 1;
                    Ok(vec![0u8])
                },
                |handle: &mut Vec<u8>| {
                    handle.push(n);
                    Ok(handle.len())
                },
            )
            .unwrap();
            assert_eq!(seen, n as usize + 2);
        }
        assert_eq!(opens, 1);
        assert_eq!(slot.lock().unwrap().as_deref(), Some(&[0u8, 0, 1, 2][..]));
    }

    #[test]
    fn test_handle_failed_open_retries() {
        let slot: Mutex<Option<u32>> = Mutex::new(None);
        let failed = with_handle(
            &slot,
            || Err(ClipError::Clipboard("no display".into())),
            |_| Ok(()),
        );
        assert!(matches!(failed, Err(ClipError::Clipboard(_))));
        assert!(slot.lock().unwrap().is_none());

        with_handle(&slot, || Ok(7), |_| Ok(())).unwrap();
        assert_eq!(*slot.lock().unwrap(), Some(7));
    }

    #[test]
    fn test_handle_kept_after_failed_call() {
        let slot = Mutex::new(None);
        let result: Result<()> = with_handle(
            &slot,
            || Ok(1u32),
            |_| Err(ClipError::Clipboard("write refused".into())),
        );
        assert!(result.is_err());
        assert_eq!(*slot.lock().unwrap(), Some(1));
    }

    // --- Change detection ---

    #[test]
    fn test_monitor_first_poll_is_silent() {
        let cb = FakeClipboard::new();
        cb.set(Payload::Text("already there".into()));
        let mut monitor = ClipboardMonitor::new();
        assert_eq!(monitor.poll(&cb).unwrap(), None);
    }

    #[test]
    fn test_monitor_reports_changes_once() {
        let cb = FakeClipboard::new();
        let mut monitor = ClipboardMonitor::new();
        monitor.poll(&cb).unwrap();

        cb.set(Payload::Text("new".into()));
        let formats = monitor.poll(&cb).unwrap().unwrap();
        assert!(formats.has_text());
        assert_eq!(monitor.poll(&cb).unwrap(), None);

        cb.set(Payload::Image(solid_image(1, 1, 0)));
        let formats = monitor.poll(&cb).unwrap().unwrap();
        assert!(formats.has_image());
    }

    #[test]
    fn test_monitor_ignores_cleared_clipboard() {
        let cb = FakeClipboard::new();
        cb.set(Payload::Text("x".into()));
        let mut monitor = ClipboardMonitor::new();
        monitor.poll(&cb).unwrap();
        cb.set(Payload::Empty);
        assert_eq!(monitor.poll(&cb).unwrap(), None);
    }
}
