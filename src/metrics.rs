use std::sync::atomic::{AtomicU64, Ordering};

use crate::workflow::TerminalStatus;

/// Thread-safe counters describing workflow and search activity.
#[derive(Default)]
pub struct WorkflowMetrics {
    documents_completed: AtomicU64,
    documents_needs_review: AtomicU64,
    documents_rejected: AtomicU64,
    documents_failed: AtomicU64,
    chunks_indexed: AtomicU64,
    searches: AtomicU64,
    degraded_searches: AtomicU64,
}

impl WorkflowMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a run that reached `End`.
    pub fn record_run(&self, status: TerminalStatus) {
        let counter = match status {
            TerminalStatus::Completed => &self.documents_completed,
            TerminalStatus::NeedsReview => &self.documents_needs_review,
            TerminalStatus::Rejected => &self.documents_rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a run that aborted with a fatal error.
    pub fn record_failure(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record chunks written to the index.
    pub fn record_indexed(&self, chunk_count: u64) {
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record an answered search.
    pub fn record_search(&self, degraded: bool) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.degraded_searches.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_completed: self.documents_completed.load(Ordering::Relaxed),
            documents_needs_review: self.documents_needs_review.load(Ordering::Relaxed),
            documents_rejected: self.documents_rejected.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
            degraded_searches: self.degraded_searches.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    /// Runs that ended `completed`.
    pub documents_completed: u64,
    /// Runs that ended `needs_review`.
    pub documents_needs_review: u64,
    /// Runs that ended `rejected`.
    pub documents_rejected: u64,
    /// Runs that aborted with a fatal stage error.
    pub documents_failed: u64,
    /// Chunks written to the vector store.
    pub chunks_indexed: u64,
    /// Searches answered, degraded ones included.
    pub searches: u64,
    /// Searches answered from a single retriever.
    pub degraded_searches: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_runs_by_terminal_status() {
        let metrics = WorkflowMetrics::new();
        metrics.record_run(TerminalStatus::Completed);
        metrics.record_run(TerminalStatus::Completed);
        metrics.record_run(TerminalStatus::NeedsReview);
        metrics.record_run(TerminalStatus::Rejected);
        metrics.record_failure();
        metrics.record_indexed(7);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_completed, 2);
        assert_eq!(snapshot.documents_needs_review, 1);
        assert_eq!(snapshot.documents_rejected, 1);
        assert_eq!(snapshot.documents_failed, 1);
        assert_eq!(snapshot.chunks_indexed, 7);
    }

    #[test]
    fn degraded_searches_count_as_searches() {
        let metrics = WorkflowMetrics::new();
        metrics.record_search(false);
        metrics.record_search(true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.searches, 2);
        assert_eq!(snapshot.degraded_searches, 1);
    }
}
