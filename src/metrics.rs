//! Lightweight atomic counters for the streaming and send subsystems
//!
//! Counters only; exporting them is the embedding application's concern.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-connection streaming counters
#[derive(Debug, Default)]
pub struct StreamMetrics {
    /// Socket connect attempts (initial and reconnect)
    pub connect_attempts: AtomicU64,
    /// Reconnects scheduled after abnormal closes
    pub reconnects: AtomicU64,
    /// Inbound frames received
    pub frames_received: AtomicU64,
    /// Inbound frames dropped as unparseable
    pub frames_dropped: AtomicU64,
    /// Batches delivered downstream
    pub batches_flushed: AtomicU64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StreamMetricsSnapshot {
        StreamMetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StreamMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMetricsSnapshot {
    pub connect_attempts: u64,
    pub reconnects: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub batches_flushed: u64,
}

/// Send-pipeline counters
#[derive(Debug, Default)]
pub struct SendMetrics {
    pub sends_started: AtomicU64,
    pub sends_succeeded: AtomicU64,
    pub sends_failed: AtomicU64,
}

impl SendMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_result(&self, success: bool) {
        if success {
            self.sends_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.sends_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = StreamMetrics::new();
        metrics.connect_attempts.fetch_add(2, Ordering::Relaxed);
        metrics.frames_received.fetch_add(5, Ordering::Relaxed);
        let snap = metrics.snapshot();
        assert_eq!(snap.connect_attempts, 2);
        assert_eq!(snap.frames_received, 5);
        assert_eq!(snap.reconnects, 0);
    }
}
