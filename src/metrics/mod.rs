//! Metrics module
//!
//! Prometheus metrics for the upload pipeline, registered in the default
//! registry.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Request metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "media_uploadr_uploads_total",
        "Total number of upload requests",
        &["status"]  // "success", "failure" or "rejected"
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "media_uploadr_upload_bytes_total",
        "Total payload bytes uploaded"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "media_uploadr_upload_duration_seconds",
        "Upload duration in seconds, by winning strategy",
        &["strategy"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).unwrap();

    // Strategy metrics
    pub static ref ATTEMPTS_TOTAL: CounterVec = register_counter_vec!(
        "media_uploadr_attempts_total",
        "Strategy attempts by outcome (success or classified error kind)",
        &["strategy", "outcome"]
    ).unwrap();

    pub static ref RETRIES_TOTAL: CounterVec = register_counter_vec!(
        "media_uploadr_retries_total",
        "Backoff retries of the same strategy",
        &["strategy"]
    ).unwrap();

    // Compression metrics
    pub static ref COMPRESSION_TOTAL: CounterVec = register_counter_vec!(
        "media_uploadr_compression_total",
        "Compression results",
        &["result"]  // "compressed" or a skip reason
    ).unwrap();

    pub static ref COMPRESSION_SAVED_BYTES: Counter = register_counter!(
        "media_uploadr_compression_saved_bytes_total",
        "Bytes saved by image compression"
    ).unwrap();

    // Delete metrics
    pub static ref DELETES_TOTAL: CounterVec = register_counter_vec!(
        "media_uploadr_deletes_total",
        "Delete requests",
        &["status"]  // "deleted", "not_found" or "failure"
    ).unwrap();
}

/// Record a successful upload
pub fn record_upload_success(strategy: &str, bytes: u64, duration_secs: f64) {
    UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
    UPLOAD_DURATION
        .with_label_values(&[strategy])
        .observe(duration_secs);
}

/// Record an upload that exhausted every strategy
pub fn record_upload_failure() {
    UPLOADS_TOTAL.with_label_values(&["failure"]).inc();
}

/// Record an upload rejected by validation
pub fn record_upload_rejected() {
    UPLOADS_TOTAL.with_label_values(&["rejected"]).inc();
}

/// Record one strategy attempt
pub fn record_attempt(strategy: &str, outcome: &str) {
    ATTEMPTS_TOTAL.with_label_values(&[strategy, outcome]).inc();
}

pub fn record_retry(strategy: &str) {
    RETRIES_TOTAL.with_label_values(&[strategy]).inc();
}

/// Record a compression decision
pub fn record_compression(result: &str, original_bytes: u64, final_bytes: u64) {
    COMPRESSION_TOTAL.with_label_values(&[result]).inc();
    COMPRESSION_SAVED_BYTES.inc_by(original_bytes.saturating_sub(final_bytes) as f64);
}

pub fn record_delete(status: &str) {
    DELETES_TOTAL.with_label_values(&[status]).inc();
}

/// Render the default registry in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
