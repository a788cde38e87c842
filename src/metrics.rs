use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing refinement activity.
#[derive(Default)]
pub struct RefineryMetrics {
    documents_refined: AtomicU64,
    chunks_refined: AtomicU64,
    failures: AtomicU64,
}

impl RefineryMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a refined document and the number of chunks it produced.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_refined.fetch_add(1, Ordering::Relaxed);
        self.chunks_refined.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a document whose refinement failed.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_refined: self.documents_refined.load(Ordering::Relaxed),
            chunks_refined: self.chunks_refined.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of refinement counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents refined successfully since the accumulator was created.
    pub documents_refined: u64,
    /// Total chunks returned across all refined documents.
    pub chunks_refined: u64,
    /// Documents whose refinement returned an error.
    pub failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = RefineryMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_refined, 2);
        assert_eq!(snapshot.chunks_refined, 5);
        assert_eq!(snapshot.failures, 1);
    }

    #[test]
    fn snapshot_starts_empty() {
        let snapshot = RefineryMetrics::new().snapshot();
        assert_eq!(snapshot.documents_refined, 0);
        assert_eq!(snapshot.chunks_refined, 0);
        assert_eq!(snapshot.failures, 0);
    }
}
