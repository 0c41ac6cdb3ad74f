//! Pipeline counters.
//!
//! Cheap atomic counters the embedding application can poll or export; no
//! exporter is wired in here.

use crate::sanitize::SanitizeStats;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters covering saves, loads, deletes, and sanitizer activity.
#[derive(Debug, Default)]
pub struct PersistMetrics {
    saves_single: AtomicU64,
    saves_chunked: AtomicU64,
    chunk_records_written: AtomicU64,
    stale_chunks_cleared: AtomicU64,
    documents_loaded: AtomicU64,
    chunk_read_failures: AtomicU64,
    deletes: AtomicU64,
    strings_truncated: AtomicU64,
    arrays_truncated: AtomicU64,
    depth_capped: AtomicU64,
}

impl PersistMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_single_save(&self) {
        self.saves_single.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_chunked_save(&self, chunk_records: u64) {
        self.saves_chunked.fetch_add(1, Ordering::Relaxed);
        self.chunk_records_written
            .fetch_add(chunk_records, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_stale_chunks_cleared(&self, count: u64) {
        self.stale_chunks_cleared.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_documents_loaded(&self, count: u64) {
        self.documents_loaded.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_chunk_read_failure(&self) {
        self.chunk_read_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sanitize(&self, stats: &SanitizeStats) {
        if stats.is_clean() {
            return;
        }
        self.strings_truncated
            .fetch_add(stats.strings_truncated, Ordering::Relaxed);
        self.arrays_truncated
            .fetch_add(stats.arrays_truncated, Ordering::Relaxed);
        self.depth_capped.fetch_add(stats.depth_capped, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            saves_single: self.saves_single.load(Ordering::Relaxed),
            saves_chunked: self.saves_chunked.load(Ordering::Relaxed),
            chunk_records_written: self.chunk_records_written.load(Ordering::Relaxed),
            stale_chunks_cleared: self.stale_chunks_cleared.load(Ordering::Relaxed),
            documents_loaded: self.documents_loaded.load(Ordering::Relaxed),
            chunk_read_failures: self.chunk_read_failures.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            strings_truncated: self.strings_truncated.load(Ordering::Relaxed),
            arrays_truncated: self.arrays_truncated.load(Ordering::Relaxed),
            depth_capped: self.depth_capped.load(Ordering::Relaxed),
        }
    }
}

/// Plain-value view of [`PersistMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Documents stored as one record.
    pub saves_single: u64,
    /// Documents stored as manifest plus chunks.
    pub saves_chunked: u64,
    /// Chunk records written across all chunked saves.
    pub chunk_records_written: u64,
    /// Stale chunk records deleted during saves.
    pub stale_chunks_cleared: u64,
    /// Items returned by collection loads.
    pub documents_loaded: u64,
    /// Chunked documents that failed to reassemble.
    pub chunk_read_failures: u64,
    /// Documents deleted.
    pub deletes: u64,
    /// Strings the sanitizer truncated.
    pub strings_truncated: u64,
    /// Arrays the sanitizer truncated.
    pub arrays_truncated: u64,
    /// Containers the sanitizer replaced for depth.
    pub depth_capped: u64,
}
