//! Media Uploadr Library
//!
//! Resilient client-side media upload pipeline for S3-style object storage.
//!
//! # Features
//!
//! - **Fail Fast**: size and MIME policy checked before any CPU or network work
//! - **Compression**: large JPEG/PNG/WebP images are downscaled and re-encoded
//! - **Strategy Chain**: relay, three direct request shapes and multipart,
//!   tried in order with backoff retries for transient failures only
//! - **Classified Errors**: every failure maps to one of eight kinds with a
//!   fixed, non-technical message
//! - **Diagnostics**: connection probe and asset deletion companions
//!
//! # Example
//!
//! ```no_run
//! use media_uploadr::{Config, SourceFile, Uploader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let uploader = Uploader::from_config(&config)?;
//!     let file = SourceFile::from_path("photo.jpg").await?;
//!     let url = uploader.upload(uploader.request(file, "avatars/7")).await?;
//!     println!("{url}");
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod compress;
pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod metrics;
pub mod naming;
pub mod probe;
pub mod progress;
pub mod storage;
pub mod upload;
pub mod uploader;
pub mod validation;

// Re-export commonly used types
pub use classify::{classify, ClassifiedError, ErrorKind};
pub use compress::{CompressionReport, Compressor, SkipReason};
pub use config::Config;
pub use error::{TransferError, UploadError};
pub use media::SourceFile;
pub use naming::DestinationId;
pub use probe::DiagnosticReport;
pub use progress::{ProgressCallback, ProgressEvent, ProgressReporter};
pub use upload::{Payload, StrategyChain, UploadOutcome, UploadStrategy};
pub use uploader::{UploadReport, UploadRequest, Uploader};
pub use validation::ValidationError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
