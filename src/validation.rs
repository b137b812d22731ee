//! Pre-transfer validation against the upload policy.
//!
//! Runs before compression and before any network call. Both rejections are
//! caller-input errors: they are never retried and never fall back.

use crate::config::UploadPolicy;
use crate::media::{essence, human_size, SourceFile};
use thiserror::Error;

/// Why a file was rejected. The `Display` text is shown to end users.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("This file type ({mime_type}) is not supported.")]
    UnsupportedType { mime_type: String },

    #[error("The file is too large. The maximum size is {limit}.")]
    TooLarge { size: u64, limit: String },
}

/// Check `file` against `policy`. The MIME check runs first.
pub fn validate(file: &SourceFile, policy: &UploadPolicy) -> Result<(), ValidationError> {
    if !mime_allowed(&file.mime_type, &policy.allowed_mime_types) {
        return Err(ValidationError::UnsupportedType {
            mime_type: file.mime_type.clone(),
        });
    }

    if file.byte_len() > policy.max_bytes {
        return Err(ValidationError::TooLarge {
            size: file.byte_len(),
            limit: human_size(policy.max_bytes),
        });
    }

    Ok(())
}

/// Match against exact entries and `type/*` wildcards, ignoring case and
/// MIME parameters.
pub fn mime_allowed(mime_type: &str, allowed: &[String]) -> bool {
    let actual = essence(mime_type);
    if actual.is_empty() {
        return false;
    }

    allowed.iter().any(|entry| {
        let entry = essence(entry);
        match entry.strip_suffix("/*") {
            Some(top_level) => actual
                .split_once('/')
                .is_some_and(|(top, _)| top == top_level),
            None => entry == actual,
        }
    })
}
