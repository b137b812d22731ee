//! Storage transport
//!
//! HTTP client for the object-storage backend and the optional upload relay.
//!
//! # Wire protocol
//!
//! | Operation | Request | Span Name |
//! |-----------|---------|-----------|
//! | PutObject | `PUT {endpoint}/{bucket}/{key}` | `storage.put_object` |
//! | CreateMultipartUpload | `POST ...?uploads` | `storage.create_multipart_upload` |
//! | UploadPart | `PUT ...?partNumber=N&uploadId=ID` | `storage.upload_part` |
//! | CompleteMultipartUpload | `POST ...?uploadId=ID` (XML body) | `storage.complete_multipart_upload` |
//! | AbortMultipartUpload | `DELETE ...?uploadId=ID` | `storage.abort_multipart_upload` |
//! | DeleteObject | `DELETE {endpoint}/{bucket}/{key}` | `storage.delete_object` |
//! | Relay upload | `POST {relay.url}` (multipart form) | `storage.relay_upload` |
//!
//! Error responses are decoded from S3-style `<Error>` XML (backend) or
//! `{"error": {"code", "message"}}` JSON (relay) into [`TransferError::Backend`].

pub mod body;
pub mod xml;

use crate::config::{Config, MIN_PART_SIZE};
use crate::error::TransferError;
use crate::naming::DestinationId;
use crate::progress::ProgressReporter;
use bytes::Bytes;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub use xml::CompletedPart;

/// Characters left unescaped in object keys. `/` is kept so logical paths
/// read naturally in URLs.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

const METADATA_HEADER_PREFIX: &str = "x-amz-meta-";

/// Storage client errors
#[derive(Error, Debug)]
pub enum StorageClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Relay endpoint settings
#[derive(Debug, Clone)]
pub struct RelayEndpoint {
    pub url: String,
    pub timeout: Duration,
}

/// Storage client configuration
#[derive(Debug, Clone)]
pub struct StorageClientConfig {
    pub endpoint: String,
    pub bucket: String,
    pub public_base_url: Option<String>,
    pub access_token: Option<String>,
    pub timeout: Duration,
    pub part_size: usize,
    pub relay: Option<RelayEndpoint>,
}

impl StorageClientConfig {
    /// Minimal configuration pointing at `endpoint`
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            public_base_url: None,
            access_token: None,
            timeout: Duration::from_secs(30),
            part_size: MIN_PART_SIZE,
            relay: None,
        }
    }
}

impl From<&Config> for StorageClientConfig {
    fn from(config: &Config) -> Self {
        Self {
            endpoint: config.storage.endpoint.clone(),
            bucket: config.storage.bucket.clone(),
            public_base_url: config.storage.public_base_url.clone(),
            access_token: config.storage.access_token.clone(),
            timeout: config.storage.timeout(),
            part_size: config.storage.part_size,
            relay: config.relay.as_ref().map(|relay| RelayEndpoint {
                url: relay.url.clone(),
                timeout: relay.timeout(),
            }),
        }
    }
}

/// Response of a successful object write
#[derive(Debug, Clone)]
pub struct PutObjectResponse {
    pub etag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelaySuccess {
    url: String,
}

#[derive(Debug, Deserialize)]
struct RelayFailure {
    error: RelayErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelayErrorDetail {
    Structured {
        code: Option<String>,
        message: Option<String>,
    },
    Plain(String),
}

/// Storage client
///
/// Cheap to share behind an `Arc`; the inner `reqwest::Client` pools
/// connections across requests.
pub struct StorageClient {
    config: StorageClientConfig,
    http_client: reqwest::Client,
}

impl StorageClient {
    /// Create a new storage client
    pub fn new(config: StorageClientConfig) -> Result<Self, StorageClientError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageClientError::ConfigError(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    pub fn endpoint(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    pub fn part_size(&self) -> usize {
        self.config.part_size.max(MIN_PART_SIZE)
    }

    pub fn has_relay(&self) -> bool {
        self.config.relay.is_some()
    }

    /// Address used for API calls on `destination`
    pub fn object_url(&self, destination: &DestinationId) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint(),
            self.config.bucket,
            encode_key(destination.as_str())
        )
    }

    /// Address handed back to callers after a successful upload
    pub fn public_url(&self, destination: &DestinationId) -> String {
        format!(
            "{}/{}/{}",
            self.public_base(),
            self.config.bucket,
            encode_key(destination.as_str())
        )
    }

    /// Map a URL produced by [`Self::public_url`] (or [`Self::object_url`])
    /// back to its destination. URLs the relay reports are accepted when
    /// they sit on the relay's origin with the same `/{bucket}/{key}` path.
    /// Returns `None` for URLs outside this bucket.
    pub fn destination_from_url(&self, url: &str) -> Option<DestinationId> {
        let url = url.split(['?', '#']).next().unwrap_or(url);
        let relay_origin = self.config.relay.as_ref().and_then(|r| origin_of(&r.url));

        [Some(self.public_base()), Some(self.endpoint()), relay_origin]
            .into_iter()
            .flatten()
            .find_map(|base| {
                url.strip_prefix(base)?
                    .strip_prefix('/')?
                    .strip_prefix(self.config.bucket.as_str())?
                    .strip_prefix('/')
            })
            .filter(|key| !key.is_empty())
            .and_then(|key| percent_decode_str(key).decode_utf8().ok())
            .map(|key| DestinationId::from_key(key.into_owned()))
    }

    fn public_base(&self) -> &str {
        self.config
            .public_base_url
            .as_deref()
            .unwrap_or(&self.config.endpoint)
            .trim_end_matches('/')
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http_client.request(method, url);
        match &self.config.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Upload an object (PutObject)
    ///
    /// The body is streamed in chunks so `progress` advances with the bytes
    /// actually handed to the connection; it never reaches 100 here.
    #[tracing::instrument(
        name = "storage.put_object",
        skip(self, body, metadata, progress),
        fields(
            storage.bucket = %self.config.bucket,
            storage.key = %destination,
            http.method = "PUT",
            upload.bytes = body.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn put_object(
        &self,
        destination: &DestinationId,
        body: Bytes,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
        query: &[(&str, &str)],
        progress: &ProgressReporter,
    ) -> Result<PutObjectResponse, TransferError> {
        let content_length = body.len();
        let response = self
            .request(Method::PUT, &self.object_url(destination))
            .query(query)
            .headers(metadata_headers(metadata))
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, content_length)
            .body(body::progress_body(body, progress.clone()))
            .send()
            .await?;

        let response = check_status(response).await?;
        let etag = header_string(response.headers(), ETAG);

        tracing::info!(etag = ?etag, bytes = content_length, "PutObject completed");

        Ok(PutObjectResponse { etag })
    }

    /// Create a multipart upload, returning its upload id
    #[tracing::instrument(
        name = "storage.create_multipart_upload",
        skip(self, metadata),
        fields(
            storage.bucket = %self.config.bucket,
            storage.key = %destination,
            http.method = "POST",
            storage.upload_id = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn create_multipart_upload(
        &self,
        destination: &DestinationId,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String, TransferError> {
        let response = self
            .request(Method::POST, &self.object_url(destination))
            .query(&[("uploads", "")])
            .headers(metadata_headers(metadata))
            .header(CONTENT_TYPE, content_type)
            .send()
            .await?;

        let response = check_status(response).await?;
        let text = response.text().await?;
        let upload_id = xml::parse_initiate(&text)
            .map_err(|e| TransferError::Other(format!("Malformed multipart initiation response: {e}")))?
            .upload_id;

        tracing::Span::current().record("storage.upload_id", upload_id.as_str());
        tracing::info!(upload_id = %upload_id, "CreateMultipartUpload completed");

        Ok(upload_id)
    }

    /// Upload one part of a multipart upload
    #[tracing::instrument(
        name = "storage.upload_part",
        skip(self, body),
        fields(
            storage.bucket = %self.config.bucket,
            storage.key = %destination,
            storage.upload_id = %upload_id,
            storage.part_number = part_number,
            http.method = "PUT",
            upload.bytes = body.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload_part(
        &self,
        destination: &DestinationId,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<CompletedPart, TransferError> {
        let part_number_param = part_number.to_string();
        let response = self
            .request(Method::PUT, &self.object_url(destination))
            .query(&[
                ("partNumber", part_number_param.as_str()),
                ("uploadId", upload_id),
            ])
            .header(CONTENT_LENGTH, body.len())
            .body(body)
            .send()
            .await?;

        let response = check_status(response).await?;
        let etag = header_string(response.headers(), ETAG).ok_or_else(|| {
            TransferError::Other(format!("UploadPart {part_number} response has no ETag"))
        })?;

        tracing::debug!(etag = %etag, part_number, "UploadPart completed");

        Ok(CompletedPart { part_number, etag })
    }

    /// Complete a multipart upload
    #[tracing::instrument(
        name = "storage.complete_multipart_upload",
        skip(self, parts),
        fields(
            storage.bucket = %self.config.bucket,
            storage.key = %destination,
            storage.upload_id = %upload_id,
            http.method = "POST",
            parts_count = parts.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn complete_multipart_upload(
        &self,
        destination: &DestinationId,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), TransferError> {
        let document = xml::complete_body(parts)
            .map_err(|e| TransferError::Other(format!("Could not encode part list: {e}")))?;

        let response = self
            .request(Method::POST, &self.object_url(destination))
            .query(&[("uploadId", upload_id)])
            .header(CONTENT_TYPE, "application/xml")
            .body(document)
            .send()
            .await?;

        let response = check_status(response).await?;
        // Completion can fail after the 200 status line has been sent
        let text = response.text().await?;
        if let Some(error) = xml::parse_error(&text) {
            return Err(TransferError::Backend {
                status: StatusCode::OK.as_u16(),
                code: error.code,
                message: error.message.unwrap_or_default(),
            });
        }

        tracing::info!(parts = parts.len(), "CompleteMultipartUpload completed");
        Ok(())
    }

    /// Abort a multipart upload, discarding uploaded parts
    #[tracing::instrument(
        name = "storage.abort_multipart_upload",
        skip(self),
        fields(
            storage.bucket = %self.config.bucket,
            storage.key = %destination,
            storage.upload_id = %upload_id,
            http.method = "DELETE"
        ),
        err
    )]
    pub async fn abort_multipart_upload(
        &self,
        destination: &DestinationId,
        upload_id: &str,
    ) -> Result<(), TransferError> {
        let response = self
            .request(Method::DELETE, &self.object_url(destination))
            .query(&[("uploadId", upload_id)])
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    /// Delete an object. A missing object is reported as
    /// [`TransferError::NotFound`].
    #[tracing::instrument(
        name = "storage.delete_object",
        skip(self),
        fields(
            storage.bucket = %self.config.bucket,
            storage.key = %destination,
            http.method = "DELETE",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn delete_object(&self, destination: &DestinationId) -> Result<(), TransferError> {
        let response = self
            .request(Method::DELETE, &self.object_url(destination))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(TransferError::NotFound(destination.to_string()));
        }

        match check_status(response).await {
            Err(TransferError::Backend { code: Some(code), .. }) if code == "NoSuchKey" => {
                Err(TransferError::NotFound(destination.to_string()))
            }
            Err(e) => Err(e),
            Ok(_) => {
                tracing::info!("DeleteObject completed");
                Ok(())
            }
        }
    }

    /// Upload through the relay as a multipart form, returning the URL the
    /// relay reports.
    #[tracing::instrument(
        name = "storage.relay_upload",
        skip(self, body, metadata, progress),
        fields(
            storage.key = %destination,
            http.method = "POST",
            upload.bytes = body.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn relay_upload(
        &self,
        destination: &DestinationId,
        body: Bytes,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
        progress: &ProgressReporter,
    ) -> Result<String, TransferError> {
        let relay = self
            .config
            .relay
            .as_ref()
            .ok_or_else(|| TransferError::Other("No relay endpoint configured".into()))?;

        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| TransferError::Other(format!("Could not encode metadata: {e}")))?;

        let length = body.len() as u64;
        let file_part = reqwest::multipart::Part::stream_with_length(
            body::progress_body(body, progress.clone()),
            length,
        )
        .file_name(destination.file_name().to_string())
        .mime_str(content_type)?;

        let form = reqwest::multipart::Form::new()
            .text("path", destination.to_string())
            .text("contentType", content_type.to_string())
            .text("metadata", metadata_json)
            .part("file", file_part);

        let response = self
            .request(Method::POST, &relay.url)
            .timeout(relay.timeout)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());
        let text = response.text().await?;

        if !status.is_success() {
            return Err(relay_error(status, &text));
        }

        let success: RelaySuccess = serde_json::from_str(&text)
            .map_err(|e| TransferError::Other(format!("Malformed relay response: {e}")))?;

        tracing::info!(url = %success.url, "Relay upload completed");
        Ok(success.url)
    }
}

/// `scheme://host[:port]` of an absolute URL
fn origin_of(url: &str) -> Option<&str> {
    let scheme_end = url.find("://")? + 3;
    let path_start = url[scheme_end..]
        .find('/')
        .map_or(url.len(), |i| scheme_end + i);
    (path_start > scheme_end).then(|| &url[..path_start])
}

/// Percent-encode an object key, keeping `/` separators
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET).to_string()
}

fn metadata_headers(metadata: &BTreeMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (key, value) in metadata {
        let name = format!("{METADATA_HEADER_PREFIX}{}", key.to_ascii_lowercase());
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(key = %key, "Skipping metadata entry that is not a valid header"),
        }
    }
    headers
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Pass successful responses through; decode error responses
async fn check_status(response: Response) -> Result<Response, TransferError> {
    let status = response.status();
    tracing::Span::current().record("http.status_code", status.as_u16());

    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(backend_error(status, &text))
}

fn backend_error(status: StatusCode, body: &str) -> TransferError {
    let parsed = xml::parse_error(body).unwrap_or_default();
    TransferError::Backend {
        status: status.as_u16(),
        code: parsed.code,
        message: parsed
            .message
            .unwrap_or_else(|| fallback_message(status, body)),
    }
}

fn relay_error(status: StatusCode, body: &str) -> TransferError {
    let (code, message) = match serde_json::from_str::<RelayFailure>(body) {
        Ok(RelayFailure {
            error: RelayErrorDetail::Structured { code, message },
        }) => (code, message),
        Ok(RelayFailure {
            error: RelayErrorDetail::Plain(message),
        }) => (None, Some(message)),
        Err(_) => (None, None),
    };

    TransferError::Backend {
        status: status.as_u16(),
        code,
        message: message.unwrap_or_else(|| fallback_message(status, body)),
    }
}

fn fallback_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Unknown status")
            .to_string()
    } else {
        body.chars().take(512).collect()
    }
}
