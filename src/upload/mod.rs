//! Upload module
//!
//! Transfer strategies and the chain that runs them.
//!
//! Strategies are stateless procedures that move one [`Payload`] to one
//! [`DestinationId`]. The [`chain::StrategyChain`] decides between retrying a
//! strategy and falling through to the next one.

use crate::classify::ErrorKind;
use crate::error::{TransferError, UploadError};
use crate::media::SourceFile;
use crate::naming::DestinationId;
use crate::progress::ProgressReporter;
use bytes::Bytes;
use std::collections::BTreeMap;

pub mod chain;
pub mod direct;
pub mod relay;
pub mod resumable;

pub use chain::{next_transition, Backoff, StrategyChain, Transition};
pub use direct::{DirectShape, DirectStrategy};
pub use relay::RelayStrategy;
pub use resumable::ResumableStrategy;

/// What a strategy uploads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Bytes,
    /// MIME type of the original file
    pub content_type: String,
    /// Custom metadata, sent by strategies that support it
    pub metadata: BTreeMap<String, String>,
}

impl Payload {
    pub fn new(bytes: Bytes, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Payload for `file` with its original name and upload time as metadata
    pub fn from_file(file: &SourceFile) -> Self {
        Self::new(file.bytes.clone(), file.mime_type.clone())
            .with_metadata("original-name", file.name.clone())
            .with_metadata("uploaded-at", chrono::Utc::now().to_rfc3339())
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Upload strategy trait
#[async_trait::async_trait]
pub trait UploadStrategy: Send + Sync {
    /// Stable identifier used in logs, metrics and outcomes
    fn name(&self) -> &'static str;

    /// Transfer `payload` to `destination`, returning the public URL
    async fn transfer(
        &self,
        destination: &DestinationId,
        payload: &Payload,
        progress: &ProgressReporter,
    ) -> Result<String, TransferError>;
}

/// Terminal result of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success {
        url: String,
        strategy: &'static str,
        attempt: u32,
    },
    Failure {
        kind: ErrorKind,
        /// User-facing message
        message: &'static str,
        /// Raw error, for logs
        detail: String,
        strategy: &'static str,
        attempt: u32,
    },
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success { .. })
    }

    pub fn strategy(&self) -> &'static str {
        match self {
            UploadOutcome::Success { strategy, .. } | UploadOutcome::Failure { strategy, .. } => {
                strategy
            }
        }
    }

    pub fn attempt(&self) -> u32 {
        match self {
            UploadOutcome::Success { attempt, .. } | UploadOutcome::Failure { attempt, .. } => {
                *attempt
            }
        }
    }

    /// URL on success, request-level error otherwise
    pub fn into_result(self) -> Result<String, UploadError> {
        match self {
            UploadOutcome::Success { url, .. } => Ok(url),
            UploadOutcome::Failure {
                kind,
                message,
                strategy,
                attempt,
                ..
            } => Err(UploadError::Transfer {
                kind,
                message: message.to_string(),
                strategy,
                attempt,
            }),
        }
    }
}
