//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use media_uploadr::config::UploadPolicy;
use media_uploadr::progress::{ProgressCallback, ProgressEvent};
use media_uploadr::storage::{StorageClient, StorageClientConfig};
use media_uploadr::{
    DestinationId, Payload, ProgressReporter, StrategyChain, TransferError, UploadStrategy,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Strategy that replays a script of results
pub struct ScriptedStrategy {
    name: &'static str,
    script: Mutex<VecDeque<Result<(), TransferError>>>,
    otherwise: Result<(), TransferError>,
    progress: Vec<u8>,
    hang: bool,
    calls: AtomicU32,
    call_times: Mutex<Vec<Instant>>,
    destinations: Mutex<Vec<String>>,
}

impl ScriptedStrategy {
    /// Succeeds on every call unless scripted otherwise
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            script: Mutex::new(VecDeque::new()),
            otherwise: Ok(()),
            progress: Vec::new(),
            hang: false,
            calls: AtomicU32::new(0),
            call_times: Mutex::new(Vec::new()),
            destinations: Mutex::new(Vec::new()),
        }
    }

    pub fn then_fail(self, error: TransferError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn then_succeed(self) -> Self {
        self.script.lock().unwrap().push_back(Ok(()));
        self
    }

    /// Result once the script is exhausted
    pub fn otherwise_fail(mut self, error: TransferError) -> Self {
        self.otherwise = Err(error);
        self
    }

    /// Percentages reported on every call before returning
    pub fn with_progress(mut self, samples: &[u8]) -> Self {
        self.progress = samples.to_vec();
        self
    }

    /// Never returns
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    pub fn destinations(&self) -> Vec<String> {
        self.destinations.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadStrategy for ScriptedStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn transfer(
        &self,
        destination: &DestinationId,
        _payload: &Payload,
        progress: &ProgressReporter,
    ) -> Result<String, TransferError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());
        self.destinations
            .lock()
            .unwrap()
            .push(destination.to_string());

        for percent in &self.progress {
            progress.report(*percent);
        }

        if self.hang {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.otherwise.clone())
            .map(|()| format!("https://cdn.test/media/{destination}"))
    }
}

pub fn transient() -> TransferError {
    TransferError::Network("connection reset by peer".into())
}

pub fn access_denied() -> TransferError {
    TransferError::Backend {
        status: 403,
        code: Some("AccessDenied".into()),
        message: "Access Denied".into(),
    }
}

pub fn cors_rejected() -> TransferError {
    TransferError::Backend {
        status: 403,
        code: Some("CORSResponse".into()),
        message: "CORS is not enabled for this bucket".into(),
    }
}

/// Client pointing at a port nothing listens on
pub fn offline_client() -> Arc<StorageClient> {
    Arc::new(StorageClient::new(StorageClientConfig::new("http://127.0.0.1:9", "media")).unwrap())
}

pub fn image_policy(max_bytes: u64, max_retries: u32) -> UploadPolicy {
    UploadPolicy {
        max_bytes,
        max_retries,
        ..UploadPolicy::default()
    }
}

/// Progress callback recording every event
pub fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let callback: ProgressCallback = Arc::new(move |event| sink.lock().unwrap().push(event));
    (callback, events)
}

/// Within each attempt, percentages never decrease
pub fn assert_monotonic_per_attempt(events: &[ProgressEvent]) {
    for pair in events.windows(2) {
        if pair[0].attempt == pair[1].attempt {
            assert!(
                pair[0].percent <= pair[1].percent,
                "progress went backwards within attempt {}: {:?}",
                pair[0].attempt,
                pair
            );
        }
    }
}

/// Chain over scripted strategies, in order
pub fn chain_of(strategies: &[&Arc<ScriptedStrategy>]) -> StrategyChain {
    StrategyChain::new(
        strategies
            .iter()
            .map(|s| (*s).clone() as Arc<dyn UploadStrategy>)
            .collect(),
    )
}
