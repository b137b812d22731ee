//! Strategy chain orchestrator
//!
//! Runs strategies strictly in series. After a failed attempt the error is
//! classified and [`next_transition`] decides:
//!
//! - `Transient` with attempts left: sleep the backoff delay, retry the same
//!   strategy
//! - anything else: fall through to the next strategy immediately
//!
//! Success short-circuits. When every strategy has failed, the last
//! classified failure is returned. An optional deadline bounds every attempt
//! and every backoff sleep.

use super::{DirectShape, DirectStrategy, Payload, RelayStrategy, ResumableStrategy};
use super::{UploadOutcome, UploadStrategy};
use crate::classify::{classify, ErrorKind};
use crate::metrics;
use crate::naming::DestinationId;
use crate::progress::{ProgressCallback, ProgressReporter};
use crate::storage::StorageClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};

/// Exponential backoff between attempts of the same strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            cap: Duration::from_millis(2000),
        }
    }
}

impl Backoff {
    /// Delay after the failed attempt with 0-based index `failed_attempt`:
    /// `min(base * 2^n, cap)`
    pub fn delay(&self, failed_attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(failed_attempt.min(16));
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// What the chain does after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Retry { delay: Duration },
    FallThrough,
}

/// Decide the next step after attempt number `attempts_made` (1-based,
/// counted within the current strategy) failed with `kind`.
pub fn next_transition(
    kind: ErrorKind,
    attempts_made: u32,
    max_attempts: u32,
    backoff: &Backoff,
) -> Transition {
    if kind.is_retryable() && attempts_made < max_attempts.max(1) {
        Transition::Retry {
            delay: backoff.delay(attempts_made.saturating_sub(1)),
        }
    } else {
        Transition::FallThrough
    }
}

/// Per-run settings
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Total attempts per strategy (at least 1)
    pub max_attempts: u32,
    /// Overall budget for the whole chain
    pub deadline: Option<Duration>,
    pub on_progress: Option<ProgressCallback>,
}

/// Ordered list of strategies
#[derive(Clone)]
pub struct StrategyChain {
    strategies: Vec<Arc<dyn UploadStrategy>>,
    backoff: Backoff,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Arc<dyn UploadStrategy>>) -> Self {
        Self {
            strategies,
            backoff: Backoff::default(),
        }
    }

    /// Default order: relay (when configured), octet-stream, base64, simple,
    /// resumable
    pub fn standard(client: Arc<StorageClient>) -> Self {
        let mut strategies: Vec<Arc<dyn UploadStrategy>> = Vec::with_capacity(5);
        if client.has_relay() {
            strategies.push(Arc::new(RelayStrategy::new(client.clone())));
        }
        for shape in [DirectShape::OctetStream, DirectShape::Base64, DirectShape::Simple] {
            strategies.push(Arc::new(DirectStrategy::new(client.clone(), shape)));
        }
        strategies.push(Arc::new(ResumableStrategy::new(client)));
        Self::new(strategies)
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn strategies(&self) -> &[Arc<dyn UploadStrategy>] {
        &self.strategies
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Run the chain for one payload. Produces exactly one outcome.
    #[tracing::instrument(
        name = "upload.chain",
        skip(self, payload, options),
        fields(
            storage.key = %destination,
            upload.bytes = payload.len(),
            strategies = self.strategies.len()
        )
    )]
    pub async fn run(
        &self,
        destination: &DestinationId,
        payload: &Payload,
        options: RunOptions,
    ) -> UploadOutcome {
        let deadline = options.deadline.map(|budget| (Instant::now() + budget, budget));
        let max_attempts = options.max_attempts.max(1);
        let mut attempt = 0u32;
        let mut last_failure = None;

        for strategy in &self.strategies {
            let name = strategy.name();
            let mut attempts_made = 0u32;

            loop {
                attempts_made += 1;
                attempt += 1;

                let progress = ProgressReporter::new(options.on_progress.clone(), name, attempt);
                let transfer = strategy.transfer(destination, payload, &progress);
                let result = match deadline {
                    Some((at, budget)) => match timeout_at(at, transfer).await {
                        Ok(result) => result,
                        Err(_) => return deadline_exceeded(budget, name, attempt),
                    },
                    None => transfer.await,
                };

                let error = match result {
                    Ok(url) => {
                        progress.report(100);
                        metrics::record_attempt(name, "success");
                        tracing::info!(strategy = name, attempt, url = %url, "Upload succeeded");
                        return UploadOutcome::Success {
                            url,
                            strategy: name,
                            attempt,
                        };
                    }
                    Err(error) => error,
                };

                let classified = classify(&error);
                metrics::record_attempt(name, classified.kind.as_str());
                tracing::warn!(
                    strategy = name,
                    attempt,
                    kind = %classified.kind,
                    error = %error,
                    "Upload attempt failed"
                );

                let transition =
                    next_transition(classified.kind, attempts_made, max_attempts, &self.backoff);
                last_failure = Some(UploadOutcome::Failure {
                    kind: classified.kind,
                    message: classified.message,
                    detail: classified.detail,
                    strategy: name,
                    attempt,
                });

                match transition {
                    Transition::Retry { delay } => {
                        metrics::record_retry(name);
                        tracing::debug!(strategy = name, delay_ms = delay.as_millis() as u64, "Retrying");
                        match deadline {
                            Some((at, budget)) => {
                                if timeout_at(at, sleep(delay)).await.is_err() {
                                    return deadline_exceeded(budget, name, attempt);
                                }
                            }
                            None => sleep(delay).await,
                        }
                    }
                    Transition::FallThrough => {
                        tracing::info!(strategy = name, kind = %classified.kind, "Falling through to next strategy");
                        break;
                    }
                }
            }
        }

        last_failure.unwrap_or_else(|| UploadOutcome::Failure {
            kind: ErrorKind::Unknown,
            message: ErrorKind::Unknown.user_message(),
            detail: "No upload strategies are configured".to_string(),
            strategy: "none",
            attempt: 0,
        })
    }
}

fn deadline_exceeded(budget: Duration, strategy: &'static str, attempt: u32) -> UploadOutcome {
    tracing::warn!(strategy, attempt, budget_secs = budget.as_secs_f64(), "Upload deadline exceeded");
    metrics::record_attempt(strategy, ErrorKind::Timeout.as_str());
    UploadOutcome::Failure {
        kind: ErrorKind::Timeout,
        message: ErrorKind::Timeout.user_message(),
        detail: format!("Upload deadline of {budget:?} exceeded"),
        strategy,
        attempt,
    }
}
