//! Source file model and MIME helpers

use bytes::Bytes;
use std::path::Path;

/// Extension table shared by MIME inference and destination naming
const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
    ("image/svg+xml", "svg"),
    ("image/avif", "avif"),
    ("application/pdf", "pdf"),
    ("text/plain", "txt"),
    ("application/json", "json"),
    ("video/mp4", "mp4"),
];

/// A file chosen by the caller for upload.
///
/// `bytes` is reference counted, so cloning a `SourceFile` never copies the
/// payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Display name, usually the original file name
    pub name: String,
    /// Declared MIME type
    pub mime_type: String,
    pub bytes: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a local file, inferring its MIME type from the extension.
    pub async fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let mime_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(mime_for_extension)
            .unwrap_or("application/octet-stream")
            .to_string();

        Ok(Self::new(name, mime_type, data))
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Same name and MIME type, different bytes
    pub fn with_bytes(&self, bytes: Bytes) -> Self {
        Self {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            bytes,
        }
    }
}

/// Lowercased MIME type without parameters (`image/JPEG; q=1` -> `image/jpeg`)
pub fn essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let ext = extension.to_ascii_lowercase();
    if ext == "jpeg" {
        return Some("image/jpeg");
    }
    MIME_EXTENSIONS
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(mime, _)| *mime)
}

pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let essence = essence(mime_type);
    MIME_EXTENSIONS
        .iter()
        .find(|(m, _)| *m == essence)
        .map(|(_, ext)| *ext)
}

/// Format a byte count for people: `5242880` -> `5 MB`, `1536` -> `1.5 KB`
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if value.fract() == 0.0 {
        format!("{} {}", value as u64, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
