//! Server relay strategy
//!
//! Hands the file to an application-controlled relay endpoint, which performs
//! the storage write with its own credentials.

use super::{Payload, UploadStrategy};
use crate::error::TransferError;
use crate::naming::DestinationId;
use crate::progress::ProgressReporter;
use crate::storage::StorageClient;
use async_trait::async_trait;
use std::sync::Arc;

pub struct RelayStrategy {
    client: Arc<StorageClient>,
}

impl RelayStrategy {
    pub const NAME: &'static str = "server-relay";

    pub fn new(client: Arc<StorageClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UploadStrategy for RelayStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    #[tracing::instrument(
        name = "strategy.server_relay",
        skip(self, payload, progress),
        fields(storage.key = %destination, upload.bytes = payload.len())
    )]
    async fn transfer(
        &self,
        destination: &DestinationId,
        payload: &Payload,
        progress: &ProgressReporter,
    ) -> Result<String, TransferError> {
        self.client
            .relay_upload(
                destination,
                payload.bytes.clone(),
                &payload.content_type,
                &payload.metadata,
                progress,
            )
            .await
    }
}
