//! Rigid point-cloud transforms and a static frame graph.

use std::collections::{HashMap, HashSet, VecDeque};

use contracts::{
    CloudTransformer, ContractError, FrameResolver, PointCloud, PointXYZI, RigidTransform,
    StaticTransformConfig,
};
use nalgebra::Point3;
use tracing::debug;

/// Frame resolver over a fixed set of parent/child transforms.
///
/// Edges are walked in both directions, so any two frames connected through
/// the graph resolve, not only direct parent/child pairs.
#[derive(Debug, Clone, Default)]
pub struct StaticFrameResolver {
    /// frame -> [(neighbour, transform mapping neighbour points into frame)]
    edges: HashMap<String, Vec<(String, RigidTransform)>>,
}

impl StaticFrameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(frames: &[StaticTransformConfig]) -> Self {
        let mut resolver = Self::new();
        for frame in frames {
            resolver.insert(
                &frame.parent_frame,
                &frame.child_frame,
                frame.transform.to_isometry(),
            );
        }
        resolver
    }

    /// Register `parent <- child`: `transform` maps child points into parent.
    pub fn insert(&mut self, parent: &str, child: &str, transform: RigidTransform) {
        self.edges
            .entry(parent.to_string())
            .or_default()
            .push((child.to_string(), transform));
        self.edges
            .entry(child.to_string())
            .or_default()
            .push((parent.to_string(), transform.inverse()));
    }

    pub fn frames(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }
}

impl FrameResolver for StaticFrameResolver {
    fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        _stamp: f64,
    ) -> Result<RigidTransform, ContractError> {
        if target_frame == source_frame {
            return Ok(RigidTransform::identity());
        }

        // breadth-first from the target; each hop extends target <- frame
        let mut visited: HashSet<&str> = HashSet::from([target_frame]);
        let mut queue = VecDeque::from([(target_frame, RigidTransform::identity())]);

        while let Some((frame, target_from_frame)) = queue.pop_front() {
            let Some(neighbours) = self.edges.get(frame) else {
                continue;
            };
            for (next, frame_from_next) in neighbours {
                if !visited.insert(next.as_str()) {
                    continue;
                }
                let target_from_next = target_from_frame * frame_from_next;
                if next == source_frame {
                    return Ok(target_from_next);
                }
                queue.push_back((next.as_str(), target_from_next));
            }
        }

        Err(ContractError::frame_lookup(
            target_frame,
            source_frame,
            "no static transform connects the frames",
        ))
    }
}

/// Applies rigid transforms to packed XYZI clouds.
#[derive(Debug, Clone)]
pub struct RigidCloudTransformer<R> {
    resolver: R,
}

impl<R: FrameResolver> RigidCloudTransformer<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }
}

impl<R: FrameResolver> CloudTransformer for RigidCloudTransformer<R> {
    fn apply(
        &self,
        transform: &RigidTransform,
        cloud: &PointCloud,
    ) -> Result<PointCloud, ContractError> {
        let points: Vec<PointXYZI> = cloud
            .points()?
            .into_iter()
            .map(|p| {
                let moved = transform * Point3::new(p.x as f64, p.y as f64, p.z as f64);
                PointXYZI {
                    x: moved.x as f32,
                    y: moved.y as f32,
                    z: moved.z as f32,
                    intensity: p.intensity,
                }
            })
            .collect();

        Ok(PointCloud::from_points(
            cloud.stamp(),
            cloud.frame_id(),
            &points,
        ))
    }

    fn reproject(
        &self,
        cloud: &PointCloud,
        target_frame: &str,
    ) -> Result<PointCloud, ContractError> {
        if cloud.frame_id() == target_frame {
            return Ok(cloud.clone());
        }

        let transform = self
            .resolver
            .lookup(target_frame, cloud.frame_id(), cloud.stamp())?;
        debug!(
            source_frame = cloud.frame_id(),
            target_frame, "reprojecting cloud"
        );

        let mut reprojected = self.apply(&transform, cloud)?;
        reprojected.header.frame_id = target_frame.to_string();
        Ok(reprojected)
    }
}
