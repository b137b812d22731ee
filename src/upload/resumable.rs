//! Resumable (multipart) strategy
//!
//! Splits the payload into parts of the configured size and uploads them
//! with the S3 multipart API. Progress advances per completed part. A failed
//! upload is aborted so the backend can discard stored parts, including when
//! the transfer future is dropped mid-flight (e.g. the chain deadline fired).

use super::{Payload, UploadStrategy};
use crate::error::TransferError;
use crate::naming::DestinationId;
use crate::progress::ProgressReporter;
use crate::storage::{CompletedPart, StorageClient};
use async_trait::async_trait;
use std::sync::Arc;

/// Maximum parts allowed
pub const MAX_PARTS: usize = 10000;

pub struct ResumableStrategy {
    client: Arc<StorageClient>,
}

impl ResumableStrategy {
    pub const NAME: &'static str = "direct-resumable";

    pub fn new(client: Arc<StorageClient>) -> Self {
        Self { client }
    }

    async fn upload_parts(
        &self,
        destination: &DestinationId,
        upload_id: &str,
        payload: &Payload,
        progress: &ProgressReporter,
    ) -> Result<Vec<CompletedPart>, TransferError> {
        let ranges = part_ranges(payload.len(), self.client.part_size());
        if ranges.len() > MAX_PARTS {
            return Err(TransferError::Other(format!(
                "Payload needs {} parts, more than the maximum of {MAX_PARTS}",
                ranges.len()
            )));
        }

        let total = payload.len() as u64;
        let mut parts = Vec::with_capacity(ranges.len());
        for (index, (start, end)) in ranges.into_iter().enumerate() {
            let part_number = index as u32 + 1;
            let part = self
                .client
                .upload_part(
                    destination,
                    upload_id,
                    part_number,
                    payload.bytes.slice(start..end),
                )
                .await?;
            parts.push(part);
            progress.report_bytes(end as u64, total);
        }

        Ok(parts)
    }
}

async fn abort(client: &StorageClient, destination: &DestinationId, upload_id: &str) {
    if let Err(e) = client.abort_multipart_upload(destination, upload_id).await {
        tracing::warn!(
            error = %e,
            upload_id = %upload_id,
            "Failed to abort multipart upload"
        );
    }
}

/// Aborts an in-flight multipart upload when dropped while still armed
struct AbortGuard {
    client: Arc<StorageClient>,
    destination: DestinationId,
    upload_id: String,
    armed: bool,
}

impl AbortGuard {
    fn new(client: Arc<StorageClient>, destination: &DestinationId, upload_id: &str) -> Self {
        Self {
            client,
            destination: destination.clone(),
            upload_id: upload_id.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                upload_id = %self.upload_id,
                "No runtime to abort interrupted multipart upload"
            );
            return;
        };

        tracing::info!(upload_id = %self.upload_id, "Aborting interrupted multipart upload");
        let client = self.client.clone();
        let destination = self.destination.clone();
        let upload_id = std::mem::take(&mut self.upload_id);
        handle.spawn(async move {
            abort(&client, &destination, &upload_id).await;
        });
    }
}

#[async_trait]
impl UploadStrategy for ResumableStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    #[tracing::instrument(
        name = "strategy.direct_resumable",
        skip(self, payload, progress),
        fields(storage.key = %destination, upload.bytes = payload.len())
    )]
    async fn transfer(
        &self,
        destination: &DestinationId,
        payload: &Payload,
        progress: &ProgressReporter,
    ) -> Result<String, TransferError> {
        progress.report(0);

        let upload_id = self
            .client
            .create_multipart_upload(destination, &payload.content_type, &payload.metadata)
            .await?;

        let mut guard = AbortGuard::new(self.client.clone(), destination, &upload_id);

        let completed = match self.upload_parts(destination, &upload_id, payload, progress).await {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload(destination, &upload_id, &parts)
                    .await
            }
            Err(e) => Err(e),
        };

        guard.disarm();
        if let Err(e) = completed {
            abort(&self.client, destination, &upload_id).await;
            return Err(e);
        }

        Ok(self.client.public_url(destination))
    }
}

/// Byte ranges of each part. An empty payload still gets one (empty) part.
fn part_ranges(len: usize, part_size: usize) -> Vec<(usize, usize)> {
    if len == 0 {
        return vec![(0, 0)];
    }
    let part_size = part_size.max(1);
    (0..len)
        .step_by(part_size)
        .map(|start| (start, (start + part_size).min(len)))
        .collect()
}
