//! Connection probe
//!
//! Uploads a few bytes through the first strategy of the chain (and through
//! the second only if the first fails) to tell "offline" apart from
//! "misconfigured backend".

use crate::classify::{classify, ErrorKind};
use crate::naming;
use crate::progress::ProgressReporter;
use crate::storage::StorageClient;
use crate::upload::{Payload, StrategyChain};
use bytes::Bytes;
use serde::Serialize;

const PROBE_PATH: &str = "diagnostics/probe";
const PROBE_BODY: &[u8] = b"media-uploadr connection probe";

/// Outcome of [`probe`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    /// The backend (or relay) was reachable
    pub connected: bool,
    /// One of the probed strategies stored the test object
    pub can_upload: bool,
    /// `Some(true)` when a direct strategy succeeded, `Some(false)` when the
    /// final failure was a cross-origin rejection, `None` when not exercised
    pub cors_configured: Option<bool>,
    /// The first strategy of the chain succeeded
    pub api_working: bool,
    /// Strategy that stored the test object
    pub strategy: Option<&'static str>,
    /// User-facing message of the final failure
    pub error: Option<String>,
}

/// Probe the first two strategies of `chain`
#[tracing::instrument(name = "uploader.probe", skip_all)]
pub async fn probe(chain: &StrategyChain, client: &StorageClient) -> DiagnosticReport {
    let payload = Payload::new(Bytes::from_static(PROBE_BODY), "text/plain")
        .with_metadata("purpose", "connection-probe");

    let mut final_kind = None;
    for (index, strategy) in chain.strategies().iter().take(2).enumerate() {
        let name = strategy.name();
        let destination = naming::derive(PROBE_PATH, "probe.txt");

        match strategy
            .transfer(&destination, &payload, &ProgressReporter::silent())
            .await
        {
            Ok(_) => {
                tracing::info!(strategy = name, "Connection probe succeeded");
                if let Err(e) = client.delete_object(&destination).await {
                    tracing::warn!(error = %e, storage.key = %destination, "Failed to delete probe object");
                }
                return DiagnosticReport {
                    connected: true,
                    can_upload: true,
                    cors_configured: is_direct(name).then_some(true),
                    api_working: index == 0,
                    strategy: Some(name),
                    error: None,
                };
            }
            Err(e) => {
                let classified = classify(&e);
                tracing::warn!(
                    strategy = name,
                    kind = %classified.kind,
                    error = %e,
                    "Connection probe attempt failed"
                );
                final_kind = Some(classified.kind);
            }
        }
    }

    match final_kind {
        Some(kind) => DiagnosticReport {
            connected: !matches!(kind, ErrorKind::Transient | ErrorKind::Timeout),
            can_upload: false,
            cors_configured: (kind == ErrorKind::CrossOriginConfig).then_some(false),
            api_working: false,
            strategy: None,
            error: Some(kind.user_message().to_string()),
        },
        None => DiagnosticReport {
            connected: false,
            can_upload: false,
            cors_configured: None,
            api_working: false,
            strategy: None,
            error: Some("No upload strategies are configured.".to_string()),
        },
    }
}

fn is_direct(strategy: &str) -> bool {
    strategy.starts_with("direct-")
}
