//! S3-style XML documents exchanged with the storage backend

use serde::{Deserialize, Serialize};

/// `<Error>` body returned with non-2xx responses
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response to `POST ?uploads`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitiateMultipartUploadResult {
    pub upload_id: String,
}

/// Request body of `POST ?uploadId=..`
#[derive(Debug, Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
pub struct CompleteMultipartUpload<'a> {
    #[serde(rename = "Part")]
    pub parts: &'a [CompletedPart],
}

/// Part receipt kept until completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompletedPart {
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

/// Decode an `<Error>` document. Returns `None` for empty or non-error bodies.
pub fn parse_error(body: &str) -> Option<ErrorBody> {
    if !body.contains("<Error") {
        return None;
    }
    quick_xml::de::from_str::<ErrorBody>(body)
        .ok()
        .filter(|e| e.code.is_some() || e.message.is_some())
}

pub fn parse_initiate(body: &str) -> Result<InitiateMultipartUploadResult, quick_xml::de::DeError> {
    quick_xml::de::from_str(body)
}

pub fn complete_body(parts: &[CompletedPart]) -> Result<String, quick_xml::se::SeError> {
    quick_xml::se::to_string(&CompleteMultipartUpload { parts })
}
