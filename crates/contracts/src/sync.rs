//! SyncedCloudSet - Time Synchronizer output
//!
//! One round of timestamp-aligned, motion-compensated clouds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{PointCloud, SyncDiagnostics, TopicId};

/// Synchronized cloud set
///
/// Every present cloud is restamped to `reference_stamp` and expressed in
/// `frame_id`. A `None` entry means the topic had no data this round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedCloudSet {
    /// Round sequence number (monotonically increasing)
    pub round_id: u64,

    /// Oldest capture time among the round's clouds (`None` when no cloud arrived)
    pub reference_stamp: Option<f64>,

    /// Shared output frame
    pub frame_id: String,

    /// Input topic -> aligned cloud
    pub clouds: BTreeMap<TopicId, Option<PointCloud>>,

    /// Round metadata
    pub meta: RoundMeta,
}

impl SyncedCloudSet {
    /// Number of topics carrying a cloud
    pub fn present_count(&self) -> usize {
        self.clouds.values().filter(|c| c.is_some()).count()
    }

    /// Whether no topic delivered data this round
    pub fn is_empty(&self) -> bool {
        self.present_count() == 0
    }
}

/// What closed a round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundTrigger {
    /// Every configured topic delivered a cloud
    #[default]
    Complete,
    /// The deadline fired first
    Timeout,
}

impl RoundTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundTrigger::Complete => "complete",
            RoundTrigger::Timeout => "timeout",
        }
    }
}

/// Round metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoundMeta {
    /// Trigger that closed the round
    pub trigger: RoundTrigger,

    /// Topics that delivered nothing this round
    pub missing_topics: Vec<TopicId>,

    /// Topics whose cloud was dropped because reprojection or compensation failed
    pub failed_topics: Vec<TopicId>,

    /// Per-topic motion correction that was applied
    pub compensation: BTreeMap<TopicId, CompensationSummary>,

    /// Time spent closing the round (ms)
    pub processing_time_ms: f64,

    /// Time since the previous round closed (ms)
    pub cyclic_time_ms: f64,

    /// Diagnostics snapshot taken at publish
    pub diagnostics: SyncDiagnostics,
}

/// Planar motion correction applied to one cloud
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompensationSummary {
    /// Original capture time
    pub source_stamp: f64,
    /// Translation along x (m)
    pub dx: f64,
    /// Translation along y (m)
    pub dy: f64,
    /// Rotation about z (rad)
    pub dyaw: f64,
}
