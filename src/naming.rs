//! Destination identifier derivation
//!
//! Identifiers look like `{logical_path}_{timestamp_millis}_{token}.{ext}`.
//! Uniqueness is probabilistic (millisecond clock plus 48 random bits); no
//! existence check is made against the backend.

use crate::media::extension_for_mime;
use std::fmt;

/// Used when the caller passes an empty logical path
const DEFAULT_LOGICAL_PATH: &str = "uploads";

/// Used when the original file name has no usable extension
const FALLBACK_EXTENSION: &str = "bin";

const TOKEN_LEN: usize = 12;

/// Unique key under which an uploaded object is stored
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationId(String);

impl DestinationId {
    /// Wrap an already-derived key, e.g. one recovered from a URL
    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment, used as the file name in relay forms
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DestinationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive a fresh destination for `original_filename` under `logical_path`.
pub fn derive(logical_path: &str, original_filename: &str) -> DestinationId {
    derive_for(logical_path, original_filename, None)
}

/// Like [`derive`], falling back to the extension registered for
/// `mime_type` when the file name has none (`README` as `image/png` -> `png`).
pub fn derive_for(
    logical_path: &str,
    original_filename: &str,
    mime_type: Option<&str>,
) -> DestinationId {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let token = uuid::Uuid::new_v4().simple().to_string();
    derive_with(
        logical_path,
        &extension_of(original_filename, mime_type),
        timestamp,
        &token[..TOKEN_LEN],
    )
}

/// Deterministic core of [`derive`]; `extension` is used as given
pub fn derive_with(
    logical_path: &str,
    extension: &str,
    timestamp_millis: i64,
    token: &str,
) -> DestinationId {
    let path = logical_path.trim().trim_matches('/');
    let path = if path.is_empty() {
        DEFAULT_LOGICAL_PATH
    } else {
        path
    };

    DestinationId(format!("{}_{}_{}.{}", path, timestamp_millis, token, extension))
}

/// Lowercased extension of `filename`. When missing or unusual, the
/// extension registered for `mime_type`, else `bin`.
fn extension_of(filename: &str, mime_type: Option<&str>) -> String {
    filename
        .rsplit_once('.')
        .map(|(stem, ext)| (stem, ext.to_ascii_lowercase()))
        .filter(|(stem, ext)| {
            !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|(_, ext)| ext)
        .or_else(|| mime_type.and_then(extension_for_mime).map(str::to_string))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}
