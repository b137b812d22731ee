//! Direct-to-storage strategies
//!
//! Three single-request shapes, tried in this order by the default chain:
//!
//! - `direct-octet-stream`: raw bytes re-typed as `application/octet-stream`,
//!   no custom metadata. Survives backends that reject unknown content types.
//! - `direct-base64`: the base64 text of the payload as `text/plain` with
//!   `?encoding=base64`. For intermediaries that mangle binary bodies.
//! - `direct-simple`: raw bytes with the original content type and
//!   `x-amz-meta-*` metadata headers.

use super::{Payload, UploadStrategy};
use crate::error::TransferError;
use crate::naming::DestinationId;
use crate::progress::ProgressReporter;
use crate::storage::StorageClient;
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Request shape of a [`DirectStrategy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectShape {
    OctetStream,
    Base64,
    Simple,
}

impl DirectShape {
    pub fn name(self) -> &'static str {
        match self {
            DirectShape::OctetStream => "direct-octet-stream",
            DirectShape::Base64 => "direct-base64",
            DirectShape::Simple => "direct-simple",
        }
    }
}

pub struct DirectStrategy {
    client: Arc<StorageClient>,
    shape: DirectShape,
}

impl DirectStrategy {
    pub fn new(client: Arc<StorageClient>, shape: DirectShape) -> Self {
        Self { client, shape }
    }

    pub fn shape(&self) -> DirectShape {
        self.shape
    }
}

#[async_trait]
impl UploadStrategy for DirectStrategy {
    fn name(&self) -> &'static str {
        self.shape.name()
    }

    #[tracing::instrument(
        name = "strategy.direct",
        skip(self, payload, progress),
        fields(
            strategy = self.shape.name(),
            storage.key = %destination,
            upload.bytes = payload.len()
        )
    )]
    async fn transfer(
        &self,
        destination: &DestinationId,
        payload: &Payload,
        progress: &ProgressReporter,
    ) -> Result<String, TransferError> {
        match self.shape {
            DirectShape::OctetStream => {
                self.client
                    .put_object(
                        destination,
                        payload.bytes.clone(),
                        "application/octet-stream",
                        &BTreeMap::new(),
                        &[],
                        progress,
                    )
                    .await?;
            }
            DirectShape::Base64 => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(&payload.bytes);
                let mut metadata = BTreeMap::new();
                metadata.insert(
                    "original-content-type".to_string(),
                    payload.content_type.clone(),
                );
                self.client
                    .put_object(
                        destination,
                        Bytes::from(encoded),
                        "text/plain",
                        &metadata,
                        &[("encoding", "base64")],
                        progress,
                    )
                    .await?;
            }
            DirectShape::Simple => {
                self.client
                    .put_object(
                        destination,
                        payload.bytes.clone(),
                        &payload.content_type,
                        &payload.metadata,
                        &[],
                        progress,
                    )
                    .await?;
            }
        }

        Ok(self.client.public_url(destination))
    }
}
