//! Planar ego-motion compensation from the velocity history.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use contracts::{RigidTransform, VelocitySample};
use nalgebra::{Translation3, UnitQuaternion};
use tracing::{debug, warn};

use crate::motion::MotionHistory;

/// Largest integration step accepted before the walk is cut short.
pub const MAX_INTEGRATION_STEP_S: f64 = 0.1;

const SPARSITY_WARN_INTERVAL: Duration = Duration::from_secs(10);

/// Integrates buffered velocity into rigid corrections.
///
/// Owns the velocity history behind its own lock, independent of the round
/// state.
#[derive(Debug, Default)]
pub struct MotionCompensator {
    history: Mutex<MotionHistory>,
    last_sparsity_warning: Mutex<Option<Instant>>,
    truncated: AtomicU64,
}

impl MotionCompensator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one velocity sample.
    pub fn record(&self, sample: VelocitySample) {
        let mut history = self.history();
        if history.record(sample) {
            debug!(stamp = sample.stamp, "velocity stamp went backwards, history reset");
        }
    }

    /// Correction mapping points captured at `to_time` into the vehicle pose
    /// at `from_time`.
    ///
    /// Identity when no motion is known or `from_time > to_time`. A step
    /// longer than [`MAX_INTEGRATION_STEP_S`] stops the walk and the partial
    /// result is returned.
    pub fn compensate(&self, from_time: f64, to_time: f64) -> RigidTransform {
        let history = self.history();
        if history.is_empty() || from_time > to_time {
            return RigidTransform::identity();
        }

        let samples: Vec<&VelocitySample> = history.query(from_time, to_time).collect();
        let last = samples.len().saturating_sub(1);

        let (mut x, mut y, mut yaw) = (0.0_f64, 0.0_f64, 0.0_f64);
        let mut prev_stamp = from_time;

        for (i, sample) in samples.iter().enumerate() {
            let dt = if i == last {
                to_time - prev_stamp
            } else {
                sample.stamp - prev_stamp
            };

            if dt.abs() > MAX_INTEGRATION_STEP_S {
                self.note_truncation(dt, from_time, to_time);
                break;
            }

            let distance = sample.longitudinal_velocity * dt;
            yaw += sample.heading_rate * dt;
            x += distance * yaw.cos();
            y += distance * yaw.sin();
            prev_stamp = sample.stamp;
        }

        RigidTransform::from_parts(
            Translation3::new(x, y, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, yaw),
        )
    }

    /// Number of integrations cut short by sparse velocity data
    pub fn truncated_count(&self) -> u64 {
        self.truncated.load(Ordering::Relaxed)
    }

    /// Number of buffered velocity samples
    pub fn history_len(&self) -> usize {
        self.history().len()
    }

    fn history(&self) -> MutexGuard<'_, MotionHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn note_truncation(&self, dt: f64, from_time: f64, to_time: f64) {
        self.truncated.fetch_add(1, Ordering::Relaxed);
        observability::record_compensation_truncated();

        let mut last = self
            .last_sparsity_warning
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if last.map_or(true, |at| now.duration_since(at) >= SPARSITY_WARN_INTERVAL) {
            *last = Some(now);
            warn!(
                dt,
                from_time,
                to_time,
                "velocity data is too sparse, motion compensation truncated"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};

    const EPS: f64 = 1e-9;

    fn straight_line(compensator: &MotionCompensator, start: f64, count: usize, v: f64) {
        for i in 0..count {
            compensator.record(VelocitySample::new(start + i as f64 * 0.01, v, 0.0));
        }
    }

    #[test]
    fn test_identity_when_history_empty() {
        let compensator = MotionCompensator::new();
        assert_eq!(compensator.compensate(1.0, 2.0), RigidTransform::identity());
    }

    #[test]
    fn test_identity_when_interval_reversed() {
        let compensator = MotionCompensator::new();
        straight_line(&compensator, 0.0, 50, 10.0);
        assert_eq!(compensator.compensate(0.3, 0.2), RigidTransform::identity());
    }

    #[test]
    fn test_same_time_is_identity() {
        let compensator = MotionCompensator::new();
        straight_line(&compensator, 0.0, 50, 10.0);
        for t in [0.0, 0.105, 0.25, 0.49, 3.0] {
            let transform = compensator.compensate(t, t);
            assert!(transform.translation.vector.norm() < EPS, "t = {t}");
            assert!(transform.rotation.angle() < EPS, "t = {t}");
        }
    }

    #[test]
    fn test_constant_velocity_translation() {
        let compensator = MotionCompensator::new();
        straight_line(&compensator, 0.0, 50, 10.0);

        // 0.05 s at 10 m/s
        let transform = compensator.compensate(0.1, 0.15);
        assert!((transform.translation.x - 0.5).abs() < 1e-6);
        assert!(transform.translation.y.abs() < 1e-9);
        assert!(transform.translation.z.abs() < EPS);
        assert!(transform.rotation.angle() < EPS);
    }

    #[test]
    fn test_yaw_only_rotates_about_z() {
        let compensator = MotionCompensator::new();
        for i in 0..50 {
            compensator.record(VelocitySample::new(i as f64 * 0.01, 0.0, 1.0));
        }
        let transform = compensator.compensate(0.1, 0.2);
        let axis = transform.rotation.axis().unwrap();
        assert!((axis.into_inner() - Vector3::z()).norm() < 1e-9);
        assert!((transform.rotation.angle() - 0.1).abs() < 1e-6);
        assert!(transform.translation.vector.norm() < EPS);

        let p = transform * Point3::new(1.0, 0.0, 2.0);
        assert!((p.z - 2.0).abs() < EPS);
    }

    #[test]
    fn test_sparse_history_truncates() {
        let compensator = MotionCompensator::new();
        compensator.record(VelocitySample::new(0.0, 10.0, 0.0));
        compensator.record(VelocitySample::new(0.5, 10.0, 0.0));

        // first step 0.0 -> 0.5 exceeds the guard; nothing integrated
        let transform = compensator.compensate(0.0, 0.6);
        assert!(transform.translation.vector.norm() < EPS);
        assert_eq!(compensator.truncated_count(), 1);
    }

    #[test]
    fn test_record_prunes_history() {
        let compensator = MotionCompensator::new();
        straight_line(&compensator, 0.0, 300, 1.0);
        assert!(compensator.history_len() <= 101);
    }
}
