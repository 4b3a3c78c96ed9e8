//! # Ingestion Pipeline
//!
//! Transport stand-in for the time synchronizer.
//!
//! Responsibilities:
//! - Build mock point-cloud and velocity sources from `SourcesConfig`
//! - Stamp every message on one shared source clock
//! - Merge all sources into a single inbound stream
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{InboundMessage, IngestionPipeline, SourceClock};
//!
//! let mut pipeline = IngestionPipeline::from_config(&blueprint.sources, 256)?;
//! let mut rx = pipeline.take_receiver().unwrap();
//! pipeline.start_all(SourceClock::default())?;
//!
//! while let Some(msg) = rx.recv().await {
//!     match msg {
//!         InboundMessage::Cloud { topic, cloud } => sync.on_cloud(&topic, cloud)?,
//!         InboundMessage::Velocity(sample) => sync.on_velocity(sample),
//!     }
//! }
//! ```

mod config;
mod error;
mod mock;
mod pipeline;

// Re-exports
pub use config::{IngestionMetrics, MetricsSnapshot, SourceClock};
pub use error::{IngestionError, Result};
pub use mock::{InboundMessage, MockCloudSource, MockVelocitySource};
pub use pipeline::IngestionPipeline;
