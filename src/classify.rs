//! Error classification
//!
//! Maps raw [`TransferError`]s onto a closed taxonomy. Resolution order:
//!
//! 1. Known backend error codes (S3-style `<Code>` or relay JSON `code`)
//! 2. HTTP status
//! 3. Transport variant (network / timeout)
//! 4. Substring heuristics over the message, as a last resort
//!
//! Only [`ErrorKind::Transient`] is retried by the orchestrator; every other
//! kind makes it fall through to the next strategy.

use crate::error::TransferError;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    CrossOriginConfig,
    Permission,
    PayloadTooLarge,
    QuotaExceeded,
    AuthExpired,
    Timeout,
    Unknown,
}

impl ErrorKind {
    /// Whether another attempt of the same strategy may succeed
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    /// Fixed message for end users
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::Transient => {
                "Network problem while uploading. Check your internet connection and try again."
            }
            ErrorKind::CrossOriginConfig => {
                "The storage service is not configured to accept uploads from this application."
            }
            ErrorKind::Permission => "You do not have permission to upload this file.",
            ErrorKind::PayloadTooLarge => "The file is too large for the storage service.",
            ErrorKind::QuotaExceeded => {
                "The storage quota has been exceeded. Free up space or contact support."
            }
            ErrorKind::AuthExpired => "Your session has expired. Sign in again and retry.",
            ErrorKind::Timeout => {
                "The upload took too long. Try again with a smaller file or a faster connection."
            }
            ErrorKind::Unknown => "The upload failed for an unknown reason. Please try again.",
        }
    }

    /// Metric / log label
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::CrossOriginConfig => "cross_origin_config",
            ErrorKind::Permission => "permission",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::AuthExpired => "auth_expired",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// User-facing message for `kind`
    pub message: &'static str,
    /// Raw error text, for logs only
    pub detail: String,
}

/// Classify a raw transfer error. Never fails; unknown input maps to
/// [`ErrorKind::Unknown`].
pub fn classify(error: &TransferError) -> ClassifiedError {
    let kind = match error {
        TransferError::Backend {
            status,
            code,
            message,
        } => code
            .as_deref()
            .and_then(kind_for_code)
            .or_else(|| kind_for_status(*status))
            .unwrap_or_else(|| kind_from_message(message)),
        TransferError::Network(message) => match kind_from_message(message) {
            ErrorKind::CrossOriginConfig => ErrorKind::CrossOriginConfig,
            _ => ErrorKind::Transient,
        },
        TransferError::TimedOut(_) => ErrorKind::Timeout,
        TransferError::NotFound(_) => ErrorKind::Unknown,
        TransferError::Other(message) => kind_from_message(message),
    };

    ClassifiedError {
        kind,
        message: kind.user_message(),
        detail: error.to_string(),
    }
}

/// Known backend error codes
fn kind_for_code(code: &str) -> Option<ErrorKind> {
    let kind = match code {
        "InternalError" | "ServiceUnavailable" | "SlowDown" | "RequestTimeTooSkewed"
        | "storage/server-file-wrong-size" | "storage/unknown-network" => ErrorKind::Transient,
        "CORSResponse" | "CORSForbidden" | "CORSNotEnabled" | "storage/cors-not-configured" => {
            ErrorKind::CrossOriginConfig
        }
        "AccessDenied" | "AllAccessDisabled" | "AccountProblem" | "InvalidAccessKeyId"
        | "SignatureDoesNotMatch" | "storage/unauthorized" => ErrorKind::Permission,
        "EntityTooLarge" | "MaxMessageLengthExceeded" | "storage/file-too-large" => {
            ErrorKind::PayloadTooLarge
        }
        "QuotaExceeded" | "TooManyBuckets" | "storage/quota-exceeded" => ErrorKind::QuotaExceeded,
        "ExpiredToken" | "TokenRefreshRequired" | "InvalidToken" | "storage/unauthenticated" => {
            ErrorKind::AuthExpired
        }
        "RequestTimeout" | "storage/retry-limit-exceeded" => ErrorKind::Timeout,
        _ => return None,
    };
    Some(kind)
}

fn kind_for_status(status: u16) -> Option<ErrorKind> {
    let kind = match status {
        401 => ErrorKind::AuthExpired,
        403 => ErrorKind::Permission,
        408 => ErrorKind::Timeout,
        413 => ErrorKind::PayloadTooLarge,
        429 | 500 | 502 | 503 | 504 => ErrorKind::Transient,
        507 => ErrorKind::QuotaExceeded,
        _ => return None,
    };
    Some(kind)
}

/// Last-resort substring heuristic. Order matters: the first match wins.
fn kind_from_message(message: &str) -> ErrorKind {
    const PATTERNS: &[(&[&str], ErrorKind)] = &[
        (
            &["cors", "cross-origin", "preflight", "access-control-allow-origin"],
            ErrorKind::CrossOriginConfig,
        ),
        (&["quota"], ErrorKind::QuotaExceeded),
        (
            &["expired", "unauthenticated", "invalid token"],
            ErrorKind::AuthExpired,
        ),
        (
            &["unauthorized", "permission", "forbidden", "access denied"],
            ErrorKind::Permission,
        ),
        (&["too large", "payload too large"], ErrorKind::PayloadTooLarge),
        (&["timeout", "timed out"], ErrorKind::Timeout),
        (
            &["network", "connection", "reset", "unavailable", "failed to fetch"],
            ErrorKind::Transient,
        ),
    ];

    let lowered = message.to_lowercase();
    PATTERNS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lowered.contains(n)))
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}
