//! # Sync Engine
//!
//! 多路点云时间同步引擎。
//!
//! 负责：
//! - 按话题缓存当前轮 / 溢出点云
//! - 全部到齐立即发布，否则由可重置的超时触发
//! - 基于车速历史的运动补偿，统一到最早时间戳
//! - 输出 `SyncedCloudSet`
//!
//! ## 使用示例
//!
//! ```ignore
//! use std::sync::Arc;
//! use sync_engine::{RigidCloudTransformer, StaticFrameResolver, TimeSynchronizer};
//!
//! let (tx, mut rx) = TimeSynchronizer::output_channel(&config);
//! let transformer = Arc::new(RigidCloudTransformer::new(StaticFrameResolver::from_config(&frames)));
//! let sync = TimeSynchronizer::spawn(config, transformer, tx)?;
//!
//! sync.on_velocity(sample);
//! sync.on_cloud("/sensing/lidar/top/pointcloud", cloud)?;
//!
//! while let Some(set) = rx.recv().await {
//!     // Handle synchronized set
//! }
//! ```

mod aggregator;
mod compensator;
mod engine;
mod motion;
mod scheduler;
mod synchronizer;
mod transform;

pub use aggregator::{Arrival, StreamAggregator, TopicSlots};
pub use compensator::{MotionCompensator, MAX_INTEGRATION_STEP_S};
pub use engine::TimeSynchronizer;
pub use motion::{MotionHistory, HISTORY_RETENTION_S};
pub use scheduler::{Deadline, FireOutcome, TimeoutScheduler, MAX_DELAY, RETRY_INTERVAL};
pub use synchronizer::{AlignedRound, RoundSynchronizer};
pub use transform::{RigidCloudTransformer, StaticFrameResolver};

// Re-export contracts types
pub use contracts::{SyncedCloudSet, SynchronizerConfig, VelocitySample};
