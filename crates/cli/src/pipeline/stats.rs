//! Pipeline statistics and metrics.

use std::time::Duration;

use observability::RoundMetricsAggregator;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Rounds received from the synchronizer
    pub rounds_published: u64,

    /// Clouds handed to the synchronizer
    pub clouds_received: u64,

    /// Clouds the synchronizer refused (malformed or unknown topic)
    pub clouds_rejected: u64,

    /// Velocity samples handed to the synchronizer
    pub velocity_received: u64,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Number of mock sources that were started
    pub active_sources: usize,

    /// Number of configured sinks
    pub active_sinks: usize,

    /// Per-round aggregation
    pub round_metrics: RoundMetricsAggregator,

    /// Final per-sink counters: (name, written, failed, dropped)
    pub sink_counters: Vec<(String, u64, u64, u64)>,
}

impl PipelineStats {
    /// Published rounds per second
    pub fn rounds_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.rounds_published as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Rounds published: {}", self.rounds_published);
        println!("   ├─ Rounds/s: {:.2}", self.rounds_per_sec());
        println!("   ├─ Clouds received: {}", self.clouds_received);
        println!("   ├─ Clouds rejected: {}", self.clouds_rejected);
        println!("   ├─ Velocity samples: {}", self.velocity_received);
        println!("   ├─ Active sources: {}", self.active_sources);
        println!("   └─ Active sinks: {}", self.active_sinks);

        let summary = self.round_metrics.summary();

        println!("\n📈 Synchronizer");
        println!(
            "   ├─ Complete rounds: {}",
            summary.complete_rounds
        );
        println!(
            "   ├─ Timeout rounds: {} ({:.2}%)",
            summary.timeout_rounds, summary.timeout_rate
        );
        println!(
            "   ├─ Rounds with missing topics: {} ({:.2}%)",
            summary.rounds_with_missing, summary.missing_rate
        );
        println!("   ├─ Empty rounds: {}", summary.empty_rounds);
        println!("   ├─ Transform failures: {}", summary.transform_failures);
        println!("   ├─ Processing time (ms): {}", summary.processing_time_ms);
        println!("   └─ Cyclic time (ms): {}", summary.cyclic_time_ms);

        if !summary.topic_missing_counts.is_empty() {
            println!("\n⚠️  Missing Topic Counts");
            for (topic, count) in &summary.topic_missing_counts {
                println!("   ├─ {}: {}", topic, count);
            }
        }

        if !self.sink_counters.is_empty() {
            println!("\n📤 Sinks");
            for (name, written, failed, dropped) in &self.sink_counters {
                println!(
                    "   ├─ {}: written {}, failed {}, dropped {}",
                    name, written, failed, dropped
                );
            }
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_per_sec_handles_zero_duration() {
        let mut stats = PipelineStats {
            rounds_published: 20,
            ..Default::default()
        };
        assert_eq!(stats.rounds_per_sec(), 0.0);

        stats.duration = Duration::from_secs(2);
        assert!((stats.rounds_per_sec() - 10.0).abs() < f64::EPSILON);
    }
}
