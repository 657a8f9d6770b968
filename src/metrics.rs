//! Upload metrics.
//!
//! The streaming path reports uploaded byte counts to an optional
//! [`MetricsSink`], fire-and-forget; a missing sink costs nothing. Upload
//! timing is tracked per buffer in [`UploadStats`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Receiver for upload traffic measurements.
pub trait MetricsSink: Send + Sync {
    /// Record bytes pushed to the device (full uploads and partial updates).
    fn record_bytes_uploaded(&self, bytes: u64);
}

impl MetricsSink for () {
    fn record_bytes_uploaded(&self, _bytes: u64) {}
}

/// A [`MetricsSink`] that tallies uploads and bytes.
#[derive(Debug, Default)]
pub struct UploadCounter {
    uploads: AtomicU64,
    bytes: AtomicU64,
}

impl UploadCounter {
    /// Create a zeroed counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded uploads.
    pub fn uploads(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    /// Total bytes recorded.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl MetricsSink for UploadCounter {
    fn record_bytes_uploaded(&self, bytes: u64) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// Per-buffer upload timing.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadStats {
    last: Duration,
    total: Duration,
    count: u64,
}

impl UploadStats {
    /// Record one completed upload.
    pub fn record(&mut self, elapsed: Duration) {
        self.last = elapsed;
        self.total += elapsed;
        self.count += 1;
    }

    /// Duration of the most recent upload.
    pub fn last_upload_duration(&self) -> Duration {
        self.last
    }

    /// Accumulated duration of all uploads.
    pub fn total_upload_duration(&self) -> Duration {
        self.total
    }

    /// Number of completed uploads.
    pub fn upload_count(&self) -> u64 {
        self.count
    }
}
