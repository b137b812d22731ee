//! Streaming request bodies that report upload progress

use crate::progress::ProgressReporter;
use bytes::Bytes;
use futures::stream::{self, StreamExt};

/// Chunk size used when streaming a buffered payload
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Split `bytes` into [`CHUNK_SIZE`] slices (sharing the buffer) and report
/// progress as each one is handed to the transport.
pub fn progress_stream(
    bytes: Bytes,
    progress: ProgressReporter,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let total = bytes.len() as u64;
    let mut sent = 0u64;
    progress.report_bytes(0, total);

    let len = bytes.len();
    stream::iter((0..len).step_by(CHUNK_SIZE).map(move |start| {
        let end = (start + CHUNK_SIZE).min(len);
        bytes.slice(start..end)
    }))
    .map(move |chunk| {
        sent += chunk.len() as u64;
        progress.report_bytes(sent, total);
        Ok(chunk)
    })
}

/// [`progress_stream`] wrapped as a request body. Callers must set
/// `Content-Length` themselves.
pub fn progress_body(bytes: Bytes, progress: ProgressReporter) -> reqwest::Body {
    reqwest::Body::wrap_stream(progress_stream(bytes, progress))
}
