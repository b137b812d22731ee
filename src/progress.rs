//! Upload progress reporting
//!
//! Each strategy attempt gets its own [`ProgressReporter`]. Within one attempt
//! reported percentages never decrease; a new attempt (retry or fall-through)
//! starts again from its own first sample, so callers observe a reset.

use serde::Serialize;
use std::sync::atomic::{AtomicI16, Ordering};
use std::sync::Arc;

/// One progress sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// 0..=100
    pub percent: u8,
    /// Strategy producing the sample
    pub strategy: &'static str,
    /// Attempt number across the whole chain, starting at 1
    pub attempt: u32,
}

/// Caller-supplied progress callback
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

struct ReporterInner {
    callback: Option<ProgressCallback>,
    strategy: &'static str,
    attempt: u32,
    last: AtomicI16,
}

/// Per-attempt progress sink handed to strategies
#[derive(Clone)]
pub struct ProgressReporter {
    inner: Arc<ReporterInner>,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>, strategy: &'static str, attempt: u32) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                callback,
                strategy,
                attempt,
                last: AtomicI16::new(-1),
            }),
        }
    }

    /// Reporter that drops every sample
    pub fn silent() -> Self {
        Self::new(None, "silent", 0)
    }

    /// Report `percent` (clamped to 100). Samples lower than or equal to the
    /// last emitted one are dropped.
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.inner.last.fetch_max(percent as i16, Ordering::SeqCst);
        if previous >= percent as i16 {
            return;
        }

        if let Some(callback) = &self.inner.callback {
            callback(ProgressEvent {
                percent,
                strategy: self.inner.strategy,
                attempt: self.inner.attempt,
            });
        }
    }

    /// Report transferred bytes. Capped at 99 so that 100 is only reported
    /// once the backend has confirmed the upload.
    pub fn report_bytes(&self, sent: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = (sent.min(total) * 99 / total) as u8;
        self.report(percent);
    }

    /// Last emitted percentage
    pub fn last(&self) -> Option<u8> {
        let last = self.inner.last.load(Ordering::SeqCst);
        (last >= 0).then_some(last as u8)
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("strategy", &self.inner.strategy)
            .field("attempt", &self.inner.attempt)
            .field("last", &self.last())
            .finish()
    }
}
