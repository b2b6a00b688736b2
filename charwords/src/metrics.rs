use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::counter::LARGE_FILE_THRESHOLD;

/// Tracks throughput counters for one pipeline run.
///
/// Clones share the same counters, so every stage gets its own handle and
/// the coordinator reads the totals at the end.
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    // Scanner / counter metrics
    files_scanned: Arc<AtomicU64>,
    files_counted: Arc<AtomicU64>,
    files_skipped: Arc<AtomicU64>,
    mmap_files: Arc<AtomicU64>,
    bytes_read: Arc<AtomicU64>,
    terms_counted: Arc<AtomicU64>,

    // Reducer metrics
    records_reduced: Arc<AtomicU64>,

    // Scorer metrics
    pairs_scored: Arc<AtomicU64>,
    sentinel_scores: Arc<AtomicU64>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            files_scanned: Arc::new(AtomicU64::new(0)),
            files_counted: Arc::new(AtomicU64::new(0)),
            files_skipped: Arc::new(AtomicU64::new(0)),
            mmap_files: Arc::new(AtomicU64::new(0)),
            bytes_read: Arc::new(AtomicU64::new(0)),
            terms_counted: Arc::new(AtomicU64::new(0)),
            records_reduced: Arc::new(AtomicU64::new(0)),
            pairs_scored: Arc::new(AtomicU64::new(0)),
            sentinel_scores: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a path handed to the counters
    pub fn record_file_scanned(&self) {
        self.files_scanned.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a document counted to completion
    pub fn record_file_counted(&self, bytes: u64, terms: u64) {
        self.files_counted.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
        self.terms_counted.fetch_add(terms, Ordering::Relaxed);
        if bytes >= LARGE_FILE_THRESHOLD {
            self.mmap_files.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a document dropped under the skip policy
    pub fn record_file_skipped(&self) {
        let skipped = self.files_skipped.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Files skipped so far: {}", skipped);
    }

    pub fn record_reduced(&self) {
        self.records_reduced.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a batch of scores, `sentinels` of which hit the sentinel
    pub fn record_scored(&self, pairs: u64, sentinels: u64) {
        self.pairs_scored.fetch_add(pairs, Ordering::Relaxed);
        self.sentinel_scores.fetch_add(sentinels, Ordering::Relaxed);
    }

    /// Gets a snapshot of the counters
    pub fn get_stats(&self) -> PipelineStats {
        PipelineStats {
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            files_counted: self.files_counted.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            mmap_files: self.mmap_files.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            terms_counted: self.terms_counted.load(Ordering::Relaxed),
            records_reduced: self.records_reduced.load(Ordering::Relaxed),
            pairs_scored: self.pairs_scored.load(Ordering::Relaxed),
            sentinel_scores: self.sentinel_scores.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counters
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Pipeline stats:\n\
             Files scanned/counted/skipped: {}/{}/{}\n\
             Memory mapped files: {}\n\
             Bytes read: {}\n\
             Terms counted: {}\n\
             Records reduced: {}\n\
             Pairs scored (sentinel): {} ({})",
            stats.files_scanned,
            stats.files_counted,
            stats.files_skipped,
            stats.mmap_files,
            stats.bytes_read,
            stats.terms_counted,
            stats.records_reduced,
            stats.pairs_scored,
            stats.sentinel_scores
        );
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`PipelineMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub files_scanned: u64,
    pub files_counted: u64,
    pub files_skipped: u64,
    pub mmap_files: u64,
    pub bytes_read: u64,
    pub terms_counted: u64,
    pub records_reduced: u64,
    pub pairs_scored: u64,
    pub sentinel_scores: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_tracking() {
        let metrics = PipelineMetrics::new();

        metrics.record_file_scanned();
        metrics.record_file_scanned();
        metrics.record_file_counted(100, 10);
        metrics.record_file_counted(LARGE_FILE_THRESHOLD, 5);
        metrics.record_file_skipped();

        let stats = metrics.get_stats();
        assert_eq!(stats.files_scanned, 2);
        assert_eq!(stats.files_counted, 2);
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.mmap_files, 1);
        assert_eq!(stats.bytes_read, 100 + LARGE_FILE_THRESHOLD);
        assert_eq!(stats.terms_counted, 15);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = PipelineMetrics::new();
        let handle = metrics.clone();

        handle.record_reduced();
        handle.record_scored(10, 3);
        metrics.record_scored(2, 0);

        let stats = metrics.get_stats();
        assert_eq!(stats.records_reduced, 1);
        assert_eq!(stats.pairs_scored, 12);
        assert_eq!(stats.sentinel_scores, 3);
    }
}
