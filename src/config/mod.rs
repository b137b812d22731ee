//! Configuration module for Media Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation of every section.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value (may be empty)
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("STORAGE_BUCKET", "media");
/// assert_eq!(expand_env_vars("${STORAGE_BUCKET}"), "media");
/// assert_eq!(expand_env_vars("${MISSING:-fallback}"), "fallback");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default: keep the placeholder
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

/// Deserialize an optional string, expanding environment variables and
/// mapping an empty result to `None`.
fn deserialize_optional_with_env<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|s| expand_env_vars(&s))
        .filter(|s| !s.trim().is_empty()))
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Smallest part size accepted by S3-compatible multipart uploads
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub relay: Option<RelayConfig>,
    #[serde(default)]
    pub upload: UploadPolicy,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_http_url(&self.storage.endpoint) {
            return Err(ConfigError::ValidationError(
                "Invalid storage endpoint: must start with http:// or https://".into(),
            ));
        }

        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Storage bucket cannot be empty".into(),
            ));
        }

        if let Some(ref public) = self.storage.public_base_url {
            if !is_valid_http_url(public) {
                return Err(ConfigError::ValidationError(
                    "Invalid public_base_url: must start with http:// or https://".into(),
                ));
            }
        }

        if self.storage.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "storage.timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.storage.part_size < MIN_PART_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "storage.part_size {} is below the multipart minimum of {} bytes",
                self.storage.part_size, MIN_PART_SIZE
            )));
        }

        if let Some(ref relay) = self.relay {
            if !is_valid_http_url(&relay.url) {
                return Err(ConfigError::ValidationError(
                    "Invalid relay url: must start with http:// or https://".into(),
                ));
            }
            if relay.timeout_seconds == 0 {
                return Err(ConfigError::ValidationError(
                    "relay.timeout_seconds must be greater than zero".into(),
                ));
            }
        }

        self.upload.validate()?;

        if self.compression.max_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "compression.max_dimension must be greater than zero".into(),
            ));
        }

        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format '{}': must be 'json' or 'pretty'",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base URL of the object-storage API
    pub endpoint: String,

    pub bucket: String,

    /// Base used for retrievable URLs. Defaults to `endpoint`.
    #[serde(default, deserialize_with = "deserialize_optional_with_env")]
    pub public_base_url: Option<String>,

    /// Bearer token sent with every backend request.
    #[serde(default, deserialize_with = "deserialize_optional_with_env")]
    pub access_token: Option<String>,

    #[serde(default = "default_storage_timeout")]
    pub timeout_seconds: u64,

    /// Chunk size for the resumable strategy
    #[serde(default = "default_part_size")]
    pub part_size: usize,
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_storage_timeout() -> u64 {
    30
}

fn default_part_size() -> usize {
    MIN_PART_SIZE
}

/// Server-relay endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub url: String,

    #[serde(default = "default_relay_timeout")]
    pub timeout_seconds: u64,
}

impl RelayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_relay_timeout() -> u64 {
    60
}

/// Per-request upload policy.
///
/// The configured value is the default for every request; callers may
/// override it per request through [`crate::UploadRequest::with_policy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    /// Exact MIME types (`image/png`) or top-level wildcards (`image/*`)
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,

    /// Re-encode quality, 1..=100
    #[serde(default = "default_compression_quality")]
    pub compression_quality: u8,

    /// Attempts per strategy for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wall-clock budget for the whole strategy chain. `None` disables it.
    #[serde(default = "default_deadline_seconds")]
    pub deadline_seconds: Option<u64>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            allowed_mime_types: default_allowed_mime_types(),
            compression_quality: default_compression_quality(),
            max_retries: default_max_retries(),
            deadline_seconds: default_deadline_seconds(),
        }
    }
}

impl UploadPolicy {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_seconds.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_bytes must be greater than zero".into(),
            ));
        }
        if self.allowed_mime_types.is_empty() {
            return Err(ConfigError::ValidationError(
                "upload.allowed_mime_types cannot be empty".into(),
            ));
        }
        if !(1..=100).contains(&self.compression_quality) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid compression_quality {}: must be between 1 and 100",
                self.compression_quality
            )));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_retries must be at least 1".into(),
            ));
        }
        if self.deadline_seconds == Some(0) {
            return Err(ConfigError::ValidationError(
                "upload.deadline_seconds must be greater than zero when set".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_bytes() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_allowed_mime_types() -> Vec<String> {
    ["image/jpeg", "image/png", "image/webp", "image/gif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_compression_quality() -> u8 {
    80
}

fn default_max_retries() -> u32 {
    3
}

fn default_deadline_seconds() -> Option<u64> {
    Some(120)
}

/// Image compression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default = "default_compression_enabled")]
    pub enabled: bool,

    /// Files below this size are passed through untouched
    #[serde(default = "default_threshold_bytes")]
    pub threshold_bytes: u64,

    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: default_compression_enabled(),
            threshold_bytes: default_threshold_bytes(),
            max_dimension: default_max_dimension(),
        }
    }
}

fn default_compression_enabled() -> bool {
    true
}

fn default_threshold_bytes() -> u64 {
    500 * 1024 // 500 KiB
}

fn default_max_dimension() -> u32 {
    1920
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}
