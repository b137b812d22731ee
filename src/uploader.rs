//! Upload facade
//!
//! [`Uploader`] wires the pipeline together:
//! validate → compress → derive destination → strategy chain.
//!
//! # Example
//!
//! ```no_run
//! use media_uploadr::{Config, SourceFile, Uploader};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let uploader = Uploader::from_config(&config)?;
//!
//! let file = SourceFile::from_path("logo.png").await?;
//! let request = uploader
//!     .request(file, "comercios/42/logo")
//!     .on_progress(|event| println!("{}% via {}", event.percent, event.strategy));
//! let url = uploader.upload(request).await?;
//! println!("{url}");
//! # Ok(())
//! # }
//! ```

use crate::classify::classify;
use crate::compress::{CompressionReport, Compressor, SkipReason};
use crate::config::{Config, UploadPolicy};
use crate::error::{TransferError, UploadError};
use crate::media::SourceFile;
use crate::metrics;
use crate::naming::{self, DestinationId};
use crate::probe::{self, DiagnosticReport};
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::storage::{StorageClient, StorageClientConfig};
use crate::upload::chain::RunOptions;
use crate::upload::{Payload, StrategyChain, UploadOutcome};
use crate::validation;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// One upload, consumed by [`Uploader::upload`]
#[derive(Clone)]
pub struct UploadRequest {
    file: SourceFile,
    logical_path: String,
    policy: UploadPolicy,
    on_progress: Option<ProgressCallback>,
}

impl UploadRequest {
    pub fn new(file: SourceFile, logical_path: impl Into<String>, policy: UploadPolicy) -> Self {
        Self {
            file,
            logical_path: logical_path.into(),
            policy,
            on_progress: None,
        }
    }

    /// Replace the policy seeded from configuration
    pub fn with_policy(mut self, policy: UploadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn file(&self) -> &SourceFile {
        &self.file
    }

    pub fn logical_path(&self) -> &str {
        &self.logical_path
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }
}

impl std::fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequest")
            .field("file", &self.file.name)
            .field("bytes", &self.file.byte_len())
            .field("logical_path", &self.logical_path)
            .field("policy", &self.policy)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Successful upload with the details behind it
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub url: String,
    pub destination: String,
    pub strategy: &'static str,
    pub attempt: u32,
    pub compression: CompressionReport,
}

/// Upload facade
pub struct Uploader {
    client: Arc<StorageClient>,
    chain: StrategyChain,
    policy: UploadPolicy,
    compressor: Compressor,
}

impl Uploader {
    /// Build the standard pipeline from configuration
    pub fn from_config(config: &Config) -> Result<Self, UploadError> {
        let client = StorageClient::new(StorageClientConfig::from(config))
            .map_err(|e| UploadError::Storage(e.to_string()))?;
        let client = Arc::new(client);
        let chain = StrategyChain::standard(client.clone());

        Ok(Self::new(
            client,
            chain,
            config.upload.clone(),
            Compressor::new(&config.compression),
        ))
    }

    pub fn new(
        client: Arc<StorageClient>,
        chain: StrategyChain,
        policy: UploadPolicy,
        compressor: Compressor,
    ) -> Self {
        Self {
            client,
            chain,
            policy,
            compressor,
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn chain(&self) -> &StrategyChain {
        &self.chain
    }

    /// Start a request for `file` under `logical_path` with the configured
    /// policy
    pub fn request(&self, file: SourceFile, logical_path: impl Into<String>) -> UploadRequest {
        UploadRequest::new(file, logical_path, self.policy.clone())
    }

    /// Upload and return the public URL
    pub async fn upload(&self, request: UploadRequest) -> Result<String, UploadError> {
        self.upload_with_report(request).await.map(|report| report.url)
    }

    /// Upload and return the URL together with the winning strategy and the
    /// compression decision
    #[tracing::instrument(
        name = "uploader.upload",
        skip(self, request),
        fields(
            file = %request.file.name,
            path = %request.logical_path,
            upload.bytes = request.file.byte_len(),
            storage.key = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload_with_report(
        &self,
        request: UploadRequest,
    ) -> Result<UploadReport, UploadError> {
        let UploadRequest {
            file,
            logical_path,
            policy,
            on_progress,
        } = request;

        if let Err(e) = validation::validate(&file, &policy) {
            metrics::record_upload_rejected();
            tracing::info!(error = %e, "Upload rejected by validation");
            return Err(e.into());
        }

        if self.chain.is_empty() {
            return Err(UploadError::NoStrategies);
        }

        let start_time = Instant::now();
        let original_name = file.name.clone();
        let (file, compression) = self.compress(file, policy.compression_quality).await;

        let destination =
            naming::derive_for(&logical_path, &original_name, Some(&file.mime_type));
        tracing::Span::current().record("storage.key", destination.as_str());

        let payload = Payload::from_file(&file);
        let outcome = self
            .chain
            .run(
                &destination,
                &payload,
                RunOptions {
                    max_attempts: policy.max_retries,
                    deadline: policy.deadline(),
                    on_progress,
                },
            )
            .await;

        if let UploadOutcome::Failure {
            kind,
            detail,
            strategy,
            attempt,
            ..
        } = &outcome
        {
            metrics::record_upload_failure();
            tracing::error!(
                kind = %kind,
                strategy,
                attempt,
                detail = %detail,
                duration_ms = start_time.elapsed().as_millis() as u64,
                "All upload strategies failed"
            );
        }

        let strategy = outcome.strategy();
        let attempt = outcome.attempt();
        let url = outcome.into_result()?;

        metrics::record_upload_success(
            strategy,
            payload.len() as u64,
            start_time.elapsed().as_secs_f64(),
        );
        Ok(UploadReport {
            url,
            destination: destination.to_string(),
            strategy,
            attempt,
            compression,
        })
    }

    /// Compress on the blocking pool. Any failure keeps the original.
    async fn compress(&self, file: SourceFile, quality: u8) -> (SourceFile, CompressionReport) {
        let compressor = self.compressor.clone();
        let original = file.clone();
        let (file, report) =
            match tokio::task::spawn_blocking(move || compressor.compress(&file, quality)).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(error = %e, "Compression task failed, uploading original");
                    let size = original.byte_len();
                    (
                        original,
                        CompressionReport {
                            original_bytes: size,
                            final_bytes: size,
                            skipped: Some(SkipReason::Failed(e.to_string())),
                        },
                    )
                }
            };

        let result = report
            .skipped
            .as_ref()
            .map(SkipReason::as_str)
            .unwrap_or("compressed");
        metrics::record_compression(result, report.original_bytes, report.final_bytes);

        (file, report)
    }

    /// Delete a previously uploaded object by its URL.
    ///
    /// An object that no longer exists counts as deleted. URLs outside the
    /// configured bucket are rejected without a request.
    #[tracing::instrument(name = "uploader.delete_asset", skip(self), err)]
    pub async fn delete_asset(&self, url: &str) -> Result<(), UploadError> {
        let destination: DestinationId = self
            .client
            .destination_from_url(url)
            .ok_or_else(|| UploadError::ForeignUrl(url.to_string()))?;

        match self.client.delete_object(&destination).await {
            Ok(()) => {
                metrics::record_delete("deleted");
                Ok(())
            }
            Err(TransferError::NotFound(_)) => {
                metrics::record_delete("not_found");
                tracing::info!(storage.key = %destination, "Object already absent");
                Ok(())
            }
            Err(e) => {
                metrics::record_delete("failure");
                let classified = classify(&e);
                Err(UploadError::Transfer {
                    kind: classified.kind,
                    message: classified.message.to_string(),
                    strategy: "delete",
                    attempt: 1,
                })
            }
        }
    }

    /// Check whether uploads can currently succeed
    pub async fn probe_connection(&self) -> DiagnosticReport {
        probe::probe(&self.chain, &self.client).await
    }
}
