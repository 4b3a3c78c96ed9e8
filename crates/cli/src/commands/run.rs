//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::NodeBlueprint;
use std::time::Duration;
use tracing::{info, warn};

use super::load_blueprint;
use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut blueprint = load_blueprint(&args.config)?;
    apply_overrides(&mut blueprint, args)?;

    let sync = &blueprint.synchronizer;
    info!(
        output_frame = %sync.output_frame,
        topics = sync.input_topics.len(),
        timeout_sec = sync.timeout_sec,
        sources = blueprint.sources.clouds.len(),
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        max_rounds: if args.max_rounds == 0 {
            None
        } else {
            Some(args.max_rounds)
        },
        duration: if args.duration == 0 {
            None
        } else {
            Some(Duration::from_secs(args.duration))
        },
        buffer_size: args.buffer_size,
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    let pipeline = Pipeline::new(pipeline_config);

    info!("Starting pipeline...");

    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        rounds = stats.rounds_published,
        clouds = stats.clouds_received,
        duration_secs = stats.duration.as_secs_f64(),
        rounds_per_sec = format!("{:.2}", stats.rounds_per_sec()),
        "Pipeline completed"
    );
    stats.print_summary();

    info!("Time Syncer finished");
    Ok(())
}

/// Apply command-line overrides and re-validate the synchronizer section.
fn apply_overrides(blueprint: &mut NodeBlueprint, args: &RunArgs) -> Result<()> {
    if let Some(timeout) = args.timeout_sec {
        info!(timeout_sec = timeout, "Overriding synchronizer timeout from CLI");
        blueprint.synchronizer.timeout_sec = timeout;
    }
    if let Some(ref frame) = args.output_frame {
        info!(output_frame = %frame, "Overriding output frame from CLI");
        blueprint.synchronizer.output_frame = frame.clone();
    }

    blueprint
        .synchronizer
        .validate()
        .map_err(|e| CliError::invalid_override("synchronizer", e.to_string()))?;
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &NodeBlueprint) {
    let sync = &blueprint.synchronizer;
    let offsets = sync.offset_map();

    println!("\n=== Configuration Summary ===\n");
    println!("Synchronizer:");
    println!("  Output frame: {}", sync.output_frame);
    println!("  Timeout: {}s", sync.timeout_sec);
    println!("  Velocity topic: {}", sync.velocity_topic);
    println!("\nTopics ({}):", sync.input_topics.len());
    for topic in &sync.input_topics {
        match offsets.get(topic) {
            Some(offset) => println!("  - {} (offset {}s)", topic, offset),
            None => println!("  - {}", topic),
        }
    }

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
