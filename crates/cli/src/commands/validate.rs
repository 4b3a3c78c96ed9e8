//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{FrameResolver, NodeBlueprint};
use serde::Serialize;
use sync_engine::StaticFrameResolver;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    output_frame: String,
    topic_count: usize,
    timeout_sec: f64,
    offsets_configured: bool,
    static_transform_count: usize,
    source_count: usize,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            let sync = &blueprint.synchronizer;
            let source_count = blueprint.sources.clouds.len()
                + usize::from(blueprint.sources.velocity.is_some());

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    output_frame: sync.output_frame.clone(),
                    topic_count: sync.input_topics.len(),
                    timeout_sec: sync.timeout_sec,
                    offsets_configured: !sync.input_offset.is_empty(),
                    static_transform_count: blueprint.frames.len(),
                    source_count,
                    sink_count: blueprint.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &NodeBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    let sync = &blueprint.synchronizer;

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - synchronized sets will be dropped".to_string());
    }

    if blueprint.sources.velocity.is_none() {
        warnings.push(
            "No velocity source configured - motion compensation will be identity".to_string(),
        );
    }

    for topic in &sync.input_topics {
        match blueprint.sources.clouds.iter().find(|s| &s.topic == topic) {
            None => warnings.push(format!("Topic '{topic}' has no mock source")),
            Some(source) if !source.enabled => warnings.push(format!(
                "Topic '{topic}' source is disabled - every round will time out"
            )),
            Some(_) => {}
        }
    }

    // 每个点云源的坐标系都必须能变换到 output_frame
    let resolver = StaticFrameResolver::from_config(&blueprint.frames);
    for source in &blueprint.sources.clouds {
        if resolver
            .lookup(&sync.output_frame, &source.frame_id, 0.0)
            .is_err()
        {
            warnings.push(format!(
                "Frame '{}' of topic '{}' has no static transform to '{}'",
                source.frame_id, source.topic, sync.output_frame
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Output frame: {}", summary.output_frame);
            println!("  Input topics: {}", summary.topic_count);
            println!("  Timeout: {}s", summary.timeout_sec);
            println!("  Offsets configured: {}", summary.offsets_configured);
            println!("  Static transforms: {}", summary.static_transform_count);
            println!("  Sources: {}", summary.source_count);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
