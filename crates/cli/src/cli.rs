//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Time Syncer - point-cloud time synchronizer
#[derive(Parser, Debug)]
#[command(
    name = "time-syncer",
    author,
    version,
    about = "Multi-LiDAR point-cloud time synchronizer",
    long_about = "Aligns point clouds from several LiDAR streams to one reference time.\n\n\
                  Collects one cloud per topic per round, publishes on completion or \n\
                  timeout, and compensates ego motion from the vehicle velocity stream."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TIME_SYNCER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TIME_SYNCER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the synchronizer against the configured mock sources
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "TIME_SYNCER_CONFIG"
    )]
    pub config: PathBuf,

    /// Override synchronizer.timeout_sec from configuration
    #[arg(long, env = "TIME_SYNCER_TIMEOUT_SEC")]
    pub timeout_sec: Option<f64>,

    /// Override synchronizer.output_frame from configuration
    #[arg(long, env = "TIME_SYNCER_OUTPUT_FRAME")]
    pub output_frame: Option<String>,

    /// Maximum number of rounds to publish (0 = unlimited)
    #[arg(long, default_value = "0", env = "TIME_SYNCER_MAX_ROUNDS")]
    pub max_rounds: u64,

    /// Run duration in seconds (0 = until interrupted)
    #[arg(long, default_value = "0", env = "TIME_SYNCER_DURATION")]
    pub duration: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Capacity of the inbound message channel
    #[arg(long, default_value = "256", env = "TIME_SYNCER_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TIME_SYNCER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show per-topic details (offsets, mock sources)
    #[arg(long)]
    pub topics: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
