//! Pipeline orchestrator - coordinates all components.
//!
//! mock sources -> TimeSynchronizer -> Dispatcher -> sinks

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{NodeBlueprint, SyncedCloudSet};
use ingestion::{InboundMessage, IngestionPipeline, SourceClock};
use sync_engine::{RigidCloudTransformer, StaticFrameResolver, TimeSynchronizer};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::PipelineStats;
use crate::error::CliError;

/// Dispatcher flush budget at shutdown
const DISPATCHER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The node blueprint configuration
    pub blueprint: NodeBlueprint,

    /// Maximum number of rounds to publish (None = unlimited)
    pub max_rounds: Option<u64>,

    /// Run duration (None = until shutdown)
    pub duration: Option<Duration>,

    /// Inbound channel capacity
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline until `max_rounds`, `duration` or `shutdown`.
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Setup Ingestion Pipeline
        info!("Setting up mock sources...");
        let mut ingestion =
            IngestionPipeline::from_config(&blueprint.sources, self.config.buffer_size)
                .context("Failed to build mock sources")?;
        let mut ingestion_rx = ingestion
            .take_receiver()
            .ok_or_else(|| CliError::pipeline_execution("ingestion receiver already taken"))?;
        let active_sources = ingestion.source_count();

        let active_topics = ingestion.cloud_topics();
        for topic in &blueprint.synchronizer.input_topics {
            if !active_topics.contains(topic) {
                warn!(topic = %topic, "No active source for topic, it will be reported missing");
            }
        }

        // Setup Synchronizer
        info!("Configuring time synchronizer...");
        let resolver = StaticFrameResolver::from_config(&blueprint.frames);
        let transformer = Arc::new(RigidCloudTransformer::new(resolver));
        let (sync_tx, mut sync_rx) = TimeSynchronizer::output_channel(&blueprint.synchronizer);
        let synchronizer =
            TimeSynchronizer::spawn(blueprint.synchronizer.clone(), transformer, sync_tx)
                .context("Failed to start time synchronizer")?;

        // Setup Dispatcher
        info!("Setting up dispatcher...");
        if blueprint.sinks.is_empty() {
            warn!("No sinks configured - synchronized sets will be dropped");
        }
        let (dispatch_tx, dispatch_rx) =
            mpsc::channel::<SyncedCloudSet>(blueprint.synchronizer.max_queue_size.max(1));
        let dispatcher = dispatcher::create_dispatcher(blueprint.sinks.clone(), dispatch_rx)
            .context("Failed to create dispatcher")?;
        let active_sinks = blueprint.sinks.len();
        let dispatcher_handle = dispatcher.spawn();
        info!(active_sinks, "Dispatcher started");

        // Start sources
        ingestion
            .start_all(SourceClock::default())
            .context("Failed to start mock sources")?;
        info!(
            active_sources,
            max_rounds = ?self.config.max_rounds,
            duration = ?self.config.duration,
            "Pipeline running"
        );

        let mut stats = PipelineStats {
            active_sources,
            active_sinks,
            ..Default::default()
        };

        let run_deadline = async {
            match self.config.duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(run_deadline);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                msg = ingestion_rx.recv() => {
                    let Some(msg) = msg else {
                        warn!("Ingestion channel closed");
                        break;
                    };
                    match msg {
                        InboundMessage::Cloud { topic, cloud } => {
                            stats.clouds_received += 1;
                            if let Err(e) = synchronizer.on_cloud(&topic, cloud) {
                                stats.clouds_rejected += 1;
                                warn!(topic = %topic, error = %e, "Cloud rejected");
                            }
                        }
                        InboundMessage::Velocity(sample) => {
                            stats.velocity_received += 1;
                            synchronizer.on_velocity(sample);
                        }
                    }
                }
                set = sync_rx.recv() => {
                    let Some(set) = set else {
                        warn!("Synchronizer output closed");
                        break;
                    };
                    stats.rounds_published += 1;
                    stats.round_metrics.update(&set);
                    debug!(
                        round_id = set.round_id,
                        trigger = set.meta.trigger.as_str(),
                        present = set.present_count(),
                        missing = ?set.meta.missing_topics,
                        "Round published"
                    );

                    if dispatch_tx.send(set).await.is_err() {
                        warn!("Dispatcher channel closed");
                        break;
                    }

                    if let Some(max) = self.config.max_rounds {
                        if stats.rounds_published >= max {
                            info!(rounds = stats.rounds_published, "Reached max rounds limit");
                            break;
                        }
                    }
                }
                _ = &mut run_deadline => {
                    info!("Run duration elapsed");
                    break;
                }
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping pipeline...");
                    break;
                }
            }
        }

        // Shutdown
        info!("Shutting down pipeline...");
        ingestion.stop_all();
        synchronizer.shutdown().await;
        drop(dispatch_tx);

        match tokio::time::timeout(DISPATCHER_FLUSH_TIMEOUT, dispatcher_handle).await {
            Ok(Ok(sinks)) => {
                stats.sink_counters = sinks
                    .into_iter()
                    .map(|(name, c)| (name, c.written, c.failed, c.dropped))
                    .collect();
            }
            Ok(Err(e)) => warn!(error = %e, "Dispatcher task failed"),
            Err(_) => warn!("Dispatcher did not flush in time"),
        }

        let produced = ingestion.metrics().snapshot();
        debug!(
            clouds_sent = produced.clouds_sent,
            velocity_sent = produced.velocity_sent,
            send_failures = produced.send_failures,
            "Ingestion counters"
        );

        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            rounds_per_sec = format!("{:.2}", stats.rounds_per_sec()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}
