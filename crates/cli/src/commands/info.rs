//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{synchronized_topic, NodeBlueprint};
use serde::Serialize;
use tracing::info;

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    synchronizer: SynchronizerInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    topics: Vec<TopicInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    frames: Vec<FrameInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct SynchronizerInfo {
    output_frame: String,
    input_topics: Vec<String>,
    max_queue_size: usize,
    timeout_sec: f64,
    velocity_topic: String,
}

#[derive(Serialize)]
struct TopicInfo {
    input: String,
    output: String,
    offset_sec: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<SourceInfo>,
}

#[derive(Serialize)]
struct SourceInfo {
    frame_id: String,
    frequency_hz: f64,
    latency_ms: u64,
    enabled: bool,
}

#[derive(Serialize)]
struct FrameInfo {
    parent: String,
    child: String,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_topics(blueprint: &NodeBlueprint) -> Vec<TopicInfo> {
    let offsets = blueprint.synchronizer.offset_map();
    blueprint
        .synchronizer
        .input_topics
        .iter()
        .map(|topic| TopicInfo {
            input: topic.to_string(),
            output: synchronized_topic(topic),
            offset_sec: offsets.get(topic).copied().unwrap_or(0.0),
            source: blueprint
                .sources
                .clouds
                .iter()
                .find(|s| &s.topic == topic)
                .map(|s| SourceInfo {
                    frame_id: s.frame_id.clone(),
                    frequency_hz: s.frequency_hz,
                    latency_ms: s.latency_ms,
                    enabled: s.enabled,
                }),
        })
        .collect()
}

fn build_config_info(blueprint: &NodeBlueprint, args: &InfoArgs) -> ConfigInfo {
    let sync = &blueprint.synchronizer;

    let (topics, frames) = if args.topics {
        let frames = blueprint
            .frames
            .iter()
            .map(|f| FrameInfo {
                parent: f.parent_frame.clone(),
                child: f.child_frame.clone(),
            })
            .collect();
        (build_topics(blueprint), frames)
    } else {
        (Vec::new(), Vec::new())
    };

    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        synchronizer: SynchronizerInfo {
            output_frame: sync.output_frame.clone(),
            input_topics: sync.input_topics.iter().map(|t| t.to_string()).collect(),
            max_queue_size: sync.max_queue_size,
            timeout_sec: sync.timeout_sec,
            velocity_topic: sync.velocity_topic.clone(),
        },
        topics,
        frames,
        sinks,
    }
}

fn print_config_info(blueprint: &NodeBlueprint, args: &InfoArgs) {
    let sync = &blueprint.synchronizer;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Time Syncer Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⚙️  Synchronizer");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Output frame: {}", sync.output_frame);
    println!("   ├─ Timeout: {}s", sync.timeout_sec);
    println!("   ├─ Max queue size: {}", sync.max_queue_size);
    println!("   └─ Velocity topic: {}", sync.velocity_topic);

    println!("\n📡 Topics ({})", sync.input_topics.len());
    let topics = build_topics(blueprint);
    for (i, topic) in topics.iter().enumerate() {
        let is_last = i == topics.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!("   {} {} -> {}", prefix, topic.input, topic.output);

        if args.topics {
            println!("   {}  ├─ Offset: {}s", child_prefix, topic.offset_sec);
            match &topic.source {
                Some(source) => println!(
                    "   {}  └─ Source: {} @ {} Hz, latency {} ms{}",
                    child_prefix,
                    source.frame_id,
                    source.frequency_hz,
                    source.latency_ms,
                    if source.enabled { "" } else { " (disabled)" }
                ),
                None => println!("   {}  └─ Source: (none)", child_prefix),
            }
        }
    }

    if args.topics && !blueprint.frames.is_empty() {
        println!("\n🧭 Static transforms ({})", blueprint.frames.len());
        for (i, frame) in blueprint.frames.iter().enumerate() {
            let is_last = i == blueprint.frames.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            println!(
                "   {} {} -> {}",
                prefix, frame.child_frame, frame.parent_frame
            );
        }
    }

    if args.sinks && !blueprint.sinks.is_empty() {
        println!("\n📤 Sinks ({})", blueprint.sinks.len());
        for (i, sink) in blueprint.sinks.iter().enumerate() {
            let is_last = i == blueprint.sinks.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            println!("   {} {} ({:?})", prefix, sink.name, sink.sink_type);
        }
    }

    println!();
}
