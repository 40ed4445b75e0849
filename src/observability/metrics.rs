//! Metrics registry for docsql
//!
//! - Counters only (no gauges, no histograms)
//! - Monotonic increase
//! - Reset only when the store is opened

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters owned by a store handle.
///
/// All counters use relaxed atomics; values are exact once the writer that
/// produced them has returned.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    documents_inserted: AtomicU64,
    documents_updated: AtomicU64,
    documents_deleted: AtomicU64,
    index_writes: AtomicU64,
    index_lookups: AtomicU64,
    views_recomputed: AtomicU64,
    view_results_persisted: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub documents_inserted: u64,
    pub documents_updated: u64,
    pub documents_deleted: u64,
    pub index_writes: u64,
    pub index_lookups: u64,
    pub views_recomputed: u64,
    pub view_results_persisted: u64,
    pub transactions_committed: u64,
    pub transactions_rolled_back: u64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_inserted(&self) {
        self.documents_inserted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_updated(&self) {
        self.documents_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deleted(&self) {
        self.documents_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_index_writes(&self, count: u64) {
        self.index_writes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_index_lookups(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_views_recomputed(&self, count: u64) {
        self.views_recomputed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_view_results_persisted(&self, count: u64) {
        self.view_results_persisted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_commits(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rollbacks(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_inserted: self.documents_inserted.load(Ordering::Relaxed),
            documents_updated: self.documents_updated.load(Ordering::Relaxed),
            documents_deleted: self.documents_deleted.load(Ordering::Relaxed),
            index_writes: self.index_writes.load(Ordering::Relaxed),
            index_lookups: self.index_lookups.load(Ordering::Relaxed),
            views_recomputed: self.views_recomputed.load(Ordering::Relaxed),
            view_results_persisted: self.view_results_persisted.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_rolled_back: self.transactions_rolled_back.load(Ordering::Relaxed),
        }
    }

    /// Render the current snapshot as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}
