//! Progress and cancellation protocol for index runs

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Options for a single `update_index` invocation
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    /// Treat every listed document as changed
    pub reindex_all: bool,
}

/// A progress snapshot delivered to the caller
///
/// For one run, `completed_chunks` is non-decreasing across callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndexProgress {
    pub completed_chunks: usize,
    pub total_chunks: usize,
    /// True while the gateway is parked on a rate-limit backoff
    pub waiting_for_rate_limit: bool,
}

/// Cooperative cancellation handle
///
/// Checked between embedding batches and at document boundaries; an
/// in-flight provider call is allowed to finish, its results are then
/// discarded rather than partially committed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Aggregate result of one `update_index` run
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    /// Correlates log lines from one run
    pub run_id: Uuid,
    pub documents_scanned: usize,
    pub documents_changed: usize,
    pub documents_removed: usize,
    /// Documents skipped because the source failed to read them
    pub documents_failed: usize,
    pub chunks_embedded: usize,
    pub cache_hits: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl IndexStats {
    /// Share of staged chunks served from the cache
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.chunks_embedded;
        if total == 0 {
            return 1.0;
        }
        self.cache_hits as f64 / total as f64
    }
}
