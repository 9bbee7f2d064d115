//! Sink metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters for one sink dispatcher
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Messages fully accepted by the broker
    dispatched_count: AtomicU64,
    /// Chunks accepted, restarts included
    chunks_sent: AtomicU64,
    /// Transient faults that were retried
    retry_count: AtomicU64,
    /// Restarts caused by shard drift
    shard_drift_count: AtomicU64,
    /// Dispatches that ended in a fatal error
    failure_count: AtomicU64,
    /// Current depth of the buffering queue, if any
    queue_len: AtomicUsize,
    /// Buffered entries dropped after a fatal error
    dropped_count: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched_count(&self) -> u64 {
        self.dispatched_count.load(Ordering::Relaxed)
    }

    pub fn inc_dispatched_count(&self) {
        self.dispatched_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent.load(Ordering::Relaxed)
    }

    pub fn inc_chunks_sent(&self) {
        self.chunks_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry_count(&self) -> u64 {
        self.retry_count.load(Ordering::Relaxed)
    }

    pub fn inc_retry_count(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn shard_drift_count(&self) -> u64 {
        self.shard_drift_count.load(Ordering::Relaxed)
    }

    pub fn inc_shard_drift_count(&self) {
        self.shard_drift_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatched_count: self.dispatched_count(),
            chunks_sent: self.chunks_sent(),
            retry_count: self.retry_count(),
            shard_drift_count: self.shard_drift_count(),
            failure_count: self.failure_count(),
            queue_len: self.queue_len(),
            dropped_count: self.dropped_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub dispatched_count: u64,
    pub chunks_sent: u64,
    pub retry_count: u64,
    pub shard_drift_count: u64,
    pub failure_count: u64,
    pub queue_len: usize,
    pub dropped_count: u64,
}
