//! Error types shared across the pipeline
//!
//! [`TransferError`] is what strategies and the storage transport produce. It
//! never reaches callers directly: the orchestrator classifies it and callers
//! see a single [`UploadError`] whose `Display` is a non-technical message.

use crate::classify::ErrorKind;
use crate::validation::ValidationError;
use thiserror::Error;

/// Raw failure of one transfer attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The request never produced a response (DNS, connect, reset)
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    TimedOut(String),

    /// The backend or relay answered with an error status
    #[error("Backend rejected request ({status}): {message}")]
    Backend {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransferError::TimedOut(err.to_string())
        } else if err.is_connect() || err.is_request() {
            TransferError::Network(err.to_string())
        } else if let Some(status) = err.status() {
            TransferError::Backend {
                status: status.as_u16(),
                code: None,
                message: err.to_string(),
            }
        } else {
            TransferError::Other(err.to_string())
        }
    }
}

/// Request-level error returned by [`crate::Uploader`]
#[derive(Error, Debug)]
pub enum UploadError {
    /// Rejected before any transfer was attempted
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Every strategy failed; carries the last classified failure
    #[error("{message}")]
    Transfer {
        kind: ErrorKind,
        message: String,
        strategy: &'static str,
        attempt: u32,
    },

    #[error("No upload strategies are configured.")]
    NoStrategies,

    #[error("This URL does not belong to the configured storage.")]
    ForeignUrl(String),

    #[error("The file could not be read.")]
    Io(#[from] std::io::Error),

    #[error("The storage client could not be created: {0}")]
    Storage(String),
}

impl UploadError {
    /// Classified kind for transfer failures
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            UploadError::Transfer { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
