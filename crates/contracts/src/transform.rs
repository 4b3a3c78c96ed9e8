//! Geometric collaborators of the synchronizer.

use nalgebra::Isometry3;

use crate::{ContractError, PointCloud};

/// Rigid 3D transform (rotation + translation).
pub type RigidTransform = Isometry3<f64>;

/// Frame graph lookup (TF-style)
pub trait FrameResolver: Send + Sync {
    /// Transform mapping points expressed in `source_frame` into `target_frame`.
    fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: f64,
    ) -> Result<RigidTransform, ContractError>;
}

/// Point cloud transform capability
///
/// Both operations are synchronous and side-effect free; they run inside
/// the round-close critical section.
pub trait CloudTransformer: Send + Sync {
    /// Apply `transform` to every point, keeping header and layout.
    fn apply(
        &self,
        transform: &RigidTransform,
        cloud: &PointCloud,
    ) -> Result<PointCloud, ContractError>;

    /// Express `cloud` in `target_frame`.
    fn reproject(&self, cloud: &PointCloud, target_frame: &str)
        -> Result<PointCloud, ContractError>;
}
