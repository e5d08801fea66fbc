//! Diagnostic counters for both hardware links
//!
//! Internal only: none of these values change what the application sees,
//! which stays limited to connection status and sensor readings. Counters are
//! plain atomics so workers can bump them without coordination.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Link counters shared between a worker and whoever reports on it
#[derive(Debug, Default)]
pub struct LinkMetrics {
    frames_accepted: AtomicU64,
    frames_rejected: AtomicU64,
    frames_unrouted: AtomicU64,
    write_timeouts: AtomicU64,
    read_failures: AtomicU64,
    skipped_polls: AtomicU64,
    discovery_sweeps: AtomicU64,
    connection_losses: AtomicU64,
}

/// Point-in-time copy of [`LinkMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub frames_accepted: u64,
    pub frames_rejected: u64,
    pub frames_unrouted: u64,
    pub write_timeouts: u64,
    pub read_failures: u64,
    pub skipped_polls: u64,
    pub discovery_sweeps: u64,
    pub connection_losses: u64,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror the frame assembler's running totals
    pub fn record_assembler(&self, stats: protocol::AssemblerStats) {
        self.frames_accepted.store(stats.frames, Ordering::Relaxed);
        self.frames_rejected.store(stats.rejected, Ordering::Relaxed);
    }

    /// A validated frame matched no handler
    pub fn frame_unrouted(&self) {
        self.frames_unrouted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_timeout(&self) {
        self.write_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A poll tick found the previous cycle still running
    pub fn poll_skipped(&self) {
        self.skipped_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn discovery_sweep(&self) {
        self.discovery_sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_lost(&self) {
        self.connection_losses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_accepted: self.frames_accepted.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            frames_unrouted: self.frames_unrouted.load(Ordering::Relaxed),
            write_timeouts: self.write_timeouts.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            skipped_polls: self.skipped_polls.load(Ordering::Relaxed),
            discovery_sweeps: self.discovery_sweeps.load(Ordering::Relaxed),
            connection_losses: self.connection_losses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = LinkMetrics::new();
        metrics.write_timeout();
        metrics.write_timeout();
        metrics.poll_skipped();
        metrics.record_assembler(protocol::AssemblerStats {
            frames: 10,
            rejected: 3,
        });

        let snap = metrics.snapshot();
        assert_eq!(snap.write_timeouts, 2);
        assert_eq!(snap.skipped_polls, 1);
        assert_eq!(snap.frames_accepted, 10);
        assert_eq!(snap.frames_rejected, 3);
        assert_eq!(snap.connection_losses, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_string(&MetricsSnapshot::default()).unwrap();
        assert!(json.contains("\"frames_rejected\":0"));
    }
}
