//! Round synchronizer: picks the reference stamp and aligns every cloud.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{
    CloudTransformer, CompensationSummary, PointCloud, RigidTransform, TopicId,
};
use tracing::{instrument, warn};

use crate::aggregator::TopicSlots;
use crate::compensator::MotionCompensator;

/// Output of one synchronized round
#[derive(Debug, Default)]
pub struct AlignedRound {
    /// Oldest stamp among the round's clouds
    pub reference_stamp: Option<f64>,
    /// Topic -> aligned cloud (restamped, in the output frame)
    pub clouds: BTreeMap<TopicId, Option<PointCloud>>,
    /// Topics with no cloud in the round
    pub missing: Vec<TopicId>,
    /// Topics whose cloud was dropped by a transform failure
    pub failed: Vec<TopicId>,
    pub compensation: BTreeMap<TopicId, CompensationSummary>,
}

impl AlignedRound {
    /// Every topic that ends up `None` in the output.
    pub fn not_synchronized(&self) -> BTreeSet<TopicId> {
        self.clouds
            .iter()
            .filter(|(_, cloud)| cloud.is_none())
            .map(|(topic, _)| topic.clone())
            .collect()
    }
}

/// Aligns one round of clouds to a common stamp and frame.
pub struct RoundSynchronizer<'a> {
    pub output_frame: &'a str,
    pub compensator: &'a MotionCompensator,
    pub transformer: &'a dyn CloudTransformer,
}

impl RoundSynchronizer<'_> {
    /// Align `round`.
    ///
    /// A round without any cloud yields an all-`None` set. A cloud whose
    /// reprojection or compensation fails is dropped; the others still
    /// publish.
    #[instrument(level = "debug", name = "synchronize_round", skip_all, fields(topics = round.len()))]
    pub fn synchronize(&self, round: TopicSlots) -> AlignedRound {
        let mut stamps: Vec<f64> = round
            .values()
            .flatten()
            .map(PointCloud::stamp)
            .collect();
        stamps.sort_by(|a, b| b.total_cmp(a));
        stamps.dedup();

        let mut aligned = AlignedRound {
            reference_stamp: stamps.last().copied(),
            ..Default::default()
        };

        let Some(reference_stamp) = aligned.reference_stamp else {
            aligned.missing = round.keys().cloned().collect();
            aligned.clouds = round.into_keys().map(|topic| (topic, None)).collect();
            return aligned;
        };

        for (topic, cloud) in round {
            let Some(cloud) = cloud else {
                aligned.missing.push(topic.clone());
                aligned.clouds.insert(topic, None);
                continue;
            };

            let correction = self.chained_correction(&stamps, cloud.stamp());
            match self.align(&cloud, &correction, reference_stamp) {
                Ok(out) => {
                    aligned.compensation.insert(
                        topic.clone(),
                        CompensationSummary {
                            source_stamp: cloud.stamp(),
                            dx: correction.translation.x,
                            dy: correction.translation.y,
                            dyaw: correction.rotation.euler_angles().2,
                        },
                    );
                    aligned.clouds.insert(topic, Some(out));
                }
                Err(e) => {
                    warn!(topic = %topic, error = %e, "failed to align cloud, dropping it from the round");
                    aligned.failed.push(topic.clone());
                    aligned.clouds.insert(topic, None);
                }
            }
        }

        aligned
    }

    /// Chain pairwise legs over the round's stamps (descending) from
    /// `stamp` down to the oldest one.
    fn chained_correction(&self, stamps_desc: &[f64], stamp: f64) -> RigidTransform {
        let mut correction = RigidTransform::identity();
        let mut transformed_stamp = stamp;
        for &leg_stamp in stamps_desc {
            correction = self.compensator.compensate(leg_stamp, transformed_stamp) * correction;
            transformed_stamp = transformed_stamp.min(leg_stamp);
        }
        correction
    }

    fn align(
        &self,
        cloud: &PointCloud,
        correction: &RigidTransform,
        reference_stamp: f64,
    ) -> Result<PointCloud, contracts::ContractError> {
        let reprojected = self.transformer.reproject(cloud, self.output_frame)?;
        let mut out = self.transformer.apply(correction, &reprojected)?;
        out.header.stamp = reference_stamp;
        out.header.frame_id = self.output_frame.to_string();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{RigidCloudTransformer, StaticFrameResolver};
    use contracts::{PointXYZI, VelocitySample};

    const EPS: f64 = 1e-6;

    fn cloud(stamp: f64, frame_id: &str) -> PointCloud {
        PointCloud::from_points(
            stamp,
            frame_id,
            &[PointXYZI {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                intensity: 1.0,
            }],
        )
    }

    fn moving_compensator(v: f64) -> MotionCompensator {
        let compensator = MotionCompensator::new();
        for i in 0..200 {
            compensator.record(VelocitySample::new(i as f64 * 0.01, v, 0.0));
        }
        compensator
    }

    fn slots(entries: &[(&str, Option<PointCloud>)]) -> TopicSlots {
        entries
            .iter()
            .map(|(t, c)| (TopicId::from(*t), c.clone()))
            .collect()
    }

    #[test]
    fn test_empty_round_publishes_all_none() {
        let compensator = MotionCompensator::new();
        let transformer = RigidCloudTransformer::new(StaticFrameResolver::new());
        let sync = RoundSynchronizer {
            output_frame: "base_link",
            compensator: &compensator,
            transformer: &transformer,
        };

        let aligned = sync.synchronize(slots(&[("/a", None), ("/b", None)]));
        assert_eq!(aligned.reference_stamp, None);
        assert_eq!(aligned.clouds.len(), 2);
        assert!(aligned.clouds.values().all(Option::is_none));
        assert_eq!(aligned.missing.len(), 2);
    }

    #[test]
    fn test_reference_is_oldest_and_all_restamped() {
        let compensator = moving_compensator(10.0);
        let transformer = RigidCloudTransformer::new(StaticFrameResolver::new());
        let sync = RoundSynchronizer {
            output_frame: "base_link",
            compensator: &compensator,
            transformer: &transformer,
        };

        let aligned = sync.synchronize(slots(&[
            ("/a", Some(cloud(1.05, "base_link"))),
            ("/b", Some(cloud(1.0, "base_link"))),
            ("/c", None),
        ]));

        assert_eq!(aligned.reference_stamp, Some(1.0));
        for topic in ["/a", "/b"] {
            let out = aligned.clouds[topic].as_ref().unwrap();
            assert_eq!(out.stamp(), 1.0);
            assert_eq!(out.frame_id(), "base_link");
        }
        assert_eq!(aligned.missing, vec![TopicId::from("/c")]);
        assert_eq!(
            aligned.not_synchronized(),
            [TopicId::from("/c")].into_iter().collect()
        );
    }

    #[test]
    fn test_newer_cloud_is_shifted_by_travelled_distance() {
        let compensator = moving_compensator(10.0);
        let transformer = RigidCloudTransformer::new(StaticFrameResolver::new());
        let sync = RoundSynchronizer {
            output_frame: "base_link",
            compensator: &compensator,
            transformer: &transformer,
        };

        let aligned = sync.synchronize(slots(&[
            ("/a", Some(cloud(1.05, "base_link"))),
            ("/b", Some(cloud(1.0, "base_link"))),
        ]));

        // 0.05 s at 10 m/s between the two captures
        let a = aligned.compensation[&TopicId::from("/a")];
        assert!((a.dx - 0.5).abs() < EPS, "dx = {}", a.dx);
        assert_eq!(a.source_stamp, 1.05);
        let b = aligned.compensation[&TopicId::from("/b")];
        assert!(b.dx.abs() < EPS);

        let point = aligned.clouds["/a"].as_ref().unwrap().points().unwrap()[0];
        assert!((point.x as f64 - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_chained_legs_match_single_integration() {
        let compensator = moving_compensator(5.0);
        let transformer = RigidCloudTransformer::new(StaticFrameResolver::new());
        let sync = RoundSynchronizer {
            output_frame: "base_link",
            compensator: &compensator,
            transformer: &transformer,
        };

        let aligned = sync.synchronize(slots(&[
            ("/a", Some(cloud(1.08, "base_link"))),
            ("/b", Some(cloud(1.04, "base_link"))),
            ("/c", Some(cloud(1.0, "base_link"))),
        ]));

        let direct = compensator.compensate(1.0, 1.08);
        let chained = aligned.compensation[&TopicId::from("/a")];
        assert!((chained.dx - direct.translation.x).abs() < EPS);
    }

    #[test]
    fn test_transform_failure_drops_only_that_cloud() {
        let compensator = MotionCompensator::new();
        let transformer = RigidCloudTransformer::new(StaticFrameResolver::new());
        let sync = RoundSynchronizer {
            output_frame: "base_link",
            compensator: &compensator,
            transformer: &transformer,
        };

        let aligned = sync.synchronize(slots(&[
            ("/a", Some(cloud(1.0, "unknown_frame"))),
            ("/b", Some(cloud(1.02, "base_link"))),
        ]));

        assert_eq!(aligned.failed, vec![TopicId::from("/a")]);
        assert!(aligned.clouds["/a"].is_none());
        assert!(aligned.clouds["/b"].is_some());
        // the failed cloud still took part in picking the reference
        assert_eq!(aligned.reference_stamp, Some(1.0));
        assert!(aligned.not_synchronized().contains("/a"));
    }
}
