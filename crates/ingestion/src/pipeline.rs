//! Ingestion Pipeline main entry

use std::collections::BTreeMap;
use std::sync::Arc;

use contracts::{SourcesConfig, TopicId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::config::{IngestionMetrics, SourceClock};
use crate::error::Result;
use crate::mock::{InboundMessage, MockCloudSource, MockVelocitySource};

/// Ingestion Pipeline
///
/// Owns every mock source of one run and merges their output into a single
/// inbound stream, the way a transport would deliver callbacks.
pub struct IngestionPipeline {
    /// Cloud sources by topic
    clouds: BTreeMap<TopicId, MockCloudSource>,

    /// Velocity source
    velocity: Option<MockVelocitySource>,

    /// Shared metrics
    metrics: Arc<IngestionMetrics>,

    /// Data sender (shared by all sources)
    tx: mpsc::Sender<InboundMessage>,

    /// Data receiver
    rx: Option<mpsc::Receiver<InboundMessage>>,

    /// Running source tasks
    handles: Vec<JoinHandle<()>>,
}

impl IngestionPipeline {
    /// Create new Ingestion Pipeline
    ///
    /// # Arguments
    /// * `channel_capacity` - Channel capacity
    pub fn new(channel_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));

        Self {
            clouds: BTreeMap::new(),
            velocity: None,
            metrics: Arc::new(IngestionMetrics::new()),
            tx,
            rx: Some(rx),
            handles: Vec::new(),
        }
    }

    /// Build every enabled source of `sources`.
    ///
    /// Disabled cloud sources are skipped, so their topic never delivers.
    pub fn from_config(sources: &SourcesConfig, channel_capacity: usize) -> Result<Self> {
        let mut pipeline = Self::new(channel_capacity);
        for cloud in &sources.clouds {
            if !cloud.enabled {
                info!(topic = %cloud.topic, "cloud source disabled");
                continue;
            }
            pipeline.register_cloud_source(MockCloudSource::new(cloud.clone())?);
        }
        if let Some(velocity) = &sources.velocity {
            pipeline.register_velocity_source(MockVelocitySource::new(velocity.clone())?);
        }
        Ok(pipeline)
    }

    /// Register a cloud source
    #[instrument(name = "ingestion_register_cloud_source", skip_all, fields(topic = %source.topic()))]
    pub fn register_cloud_source(&mut self, source: MockCloudSource) {
        debug!(topic = %source.topic(), "registered cloud source");
        self.clouds.insert(source.topic().clone(), source);
    }

    /// Register the velocity source
    pub fn register_velocity_source(&mut self, source: MockVelocitySource) {
        debug!("registered velocity source");
        self.velocity = Some(source);
    }

    /// Start all registered sources on one shared clock
    #[instrument(name = "ingestion_start_all", skip(self))]
    pub fn start_all(&mut self, clock: SourceClock) -> Result<()> {
        info!(
            clouds = self.clouds.len(),
            velocity = self.velocity.is_some(),
            "starting all sources"
        );
        if let Some(velocity) = &self.velocity {
            if !velocity.is_running() {
                let handle = velocity.start(self.tx.clone(), clock, self.metrics.clone())?;
                self.handles.push(handle);
            }
        }
        for source in self.clouds.values() {
            if !source.is_running() {
                let handle = source.start(self.tx.clone(), clock, self.metrics.clone())?;
                self.handles.push(handle);
            }
        }
        Ok(())
    }

    /// Stop all sources
    #[instrument(name = "ingestion_stop_all", skip(self))]
    pub fn stop_all(&mut self) {
        info!(count = self.source_count(), "stopping all sources");
        for source in self.clouds.values() {
            source.stop();
        }
        if let Some(velocity) = &self.velocity {
            velocity.stop();
        }
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    /// Get data stream receiver
    ///
    /// Note: Can only be called once, subsequent calls return None
    pub fn take_receiver(&mut self) -> Option<mpsc::Receiver<InboundMessage>> {
        self.rx.take()
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Registered source count (clouds + velocity)
    pub fn source_count(&self) -> usize {
        self.clouds.len() + usize::from(self.velocity.is_some())
    }

    /// Topics with a registered cloud source
    pub fn cloud_topics(&self) -> Vec<TopicId> {
        self.clouds.keys().cloned().collect()
    }

    /// Check if the source of `topic` is running
    pub fn is_source_running(&self, topic: &str) -> bool {
        self.clouds
            .get(topic)
            .map(|s| s.is_running())
            .unwrap_or(false)
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.stop_all();
    }
}
