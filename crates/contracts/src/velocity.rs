//! VelocitySample - vehicle velocity report
//!
//! Fed continuously to the motion compensator, independent of cloud rounds.

use serde::{Deserialize, Serialize};

/// Planar vehicle velocity at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocitySample {
    /// Report time (seconds, nominal device clock)
    pub stamp: f64,

    /// Forward velocity (m/s)
    pub longitudinal_velocity: f64,

    /// Sideways velocity (m/s)
    pub lateral_velocity: f64,

    /// Yaw rate (rad/s)
    pub heading_rate: f64,
}

impl VelocitySample {
    pub fn new(stamp: f64, longitudinal_velocity: f64, heading_rate: f64) -> Self {
        Self {
            stamp,
            longitudinal_velocity,
            lateral_velocity: 0.0,
            heading_rate,
        }
    }
}
