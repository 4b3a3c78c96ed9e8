//! Velocity history with time-based retention.
//!
//! Samples are kept in arrival order; stamps are expected to be
//! non-decreasing. A sample older than the oldest retained one is treated
//! as a clock rewind (log replay restart) and resets the history.

use std::collections::vec_deque::Iter;
use std::collections::VecDeque;
use std::fmt;

use contracts::VelocitySample;

/// Samples older than `newest - HISTORY_RETENTION_S` are evicted on insert.
pub const HISTORY_RETENTION_S: f64 = 1.0;

/// Ordered, time-bounded log of velocity samples
#[derive(Default)]
pub struct MotionHistory {
    samples: VecDeque<VelocitySample>,
    reset_count: u64,
}

impl fmt::Debug for MotionHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotionHistory")
            .field("len", &self.samples.len())
            .field("oldest", &self.oldest_stamp())
            .field("newest", &self.newest_stamp())
            .field("resets", &self.reset_count)
            .finish()
    }
}

impl MotionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, evicting everything outside the retention window.
    ///
    /// Returns `true` when the history was cleared because the sample
    /// predates the oldest retained one.
    pub fn record(&mut self, sample: VelocitySample) -> bool {
        let mut reset = false;
        if let Some(front) = self.samples.front() {
            if sample.stamp < front.stamp {
                self.samples.clear();
                self.reset_count += 1;
                reset = true;
            }
        }

        while let Some(front) = self.samples.front() {
            if front.stamp + HISTORY_RETENTION_S <= sample.stamp {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        self.samples.push_back(sample);
        reset
    }

    /// Samples between the first one not older than `from` and the first one
    /// not older than `to`, both inclusive.
    ///
    /// Endpoints outside the stored range clamp to the nearest sample. An
    /// empty history, or `from > to`, yields an empty view.
    pub fn query(&self, from: f64, to: f64) -> Iter<'_, VelocitySample> {
        if self.samples.is_empty() || from > to {
            return self.samples.range(0..0);
        }

        let last = self.samples.len() - 1;
        let lower = self.samples.partition_point(|s| s.stamp < from).min(last);
        let upper = self.samples.partition_point(|s| s.stamp < to).min(last);
        self.samples.range(lower..=upper)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn oldest_stamp(&self) -> Option<f64> {
        self.samples.front().map(|s| s.stamp)
    }

    pub fn newest_stamp(&self) -> Option<f64> {
        self.samples.back().map(|s| s.stamp)
    }

    /// Number of clock-rewind resets so far
    pub fn reset_count(&self) -> u64 {
        self.reset_count
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
