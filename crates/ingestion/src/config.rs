//! Ingestion metrics and shared source clock

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

/// Shared nominal clock of every mock source
///
/// Stamps are `base_stamp + elapsed` seconds, so all sources of one run
/// agree on the timeline.
#[derive(Debug, Clone, Copy)]
pub struct SourceClock {
    origin: Instant,
    base_stamp: f64,
}

impl SourceClock {
    pub fn new(base_stamp: f64) -> Self {
        Self {
            origin: Instant::now(),
            base_stamp,
        }
    }

    /// Current stamp (seconds)
    pub fn now(&self) -> f64 {
        self.base_stamp + self.origin.elapsed().as_secs_f64()
    }
}

impl Default for SourceClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Ingestion metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Total clouds produced
    pub clouds_sent: AtomicU64,

    /// Total velocity samples produced
    pub velocity_sent: AtomicU64,

    /// Messages lost because the receiver was gone
    pub send_failures: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record cloud sent
    pub fn record_cloud(&self) {
        self.clouds_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record velocity sample sent
    pub fn record_velocity(&self) {
        self.velocity_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record failed send
    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            clouds_sent: self.clouds_sent.load(Ordering::Relaxed),
            velocity_sent: self.velocity_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Total clouds produced
    pub clouds_sent: u64,

    /// Total velocity samples produced
    pub velocity_sent: u64,

    /// Messages lost because the receiver was gone
    pub send_failures: u64,
}
