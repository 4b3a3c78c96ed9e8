//! LogSink - logs round summary via tracing

use contracts::{ContractError, DataSink, SyncedCloudSet};
use tracing::{debug, info, instrument, warn};

use super::published_clouds;

/// Sink that logs round summaries for debugging
pub struct LogSink {
    name: String,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_round_summary(&self, set: &SyncedCloudSet) {
        info!(
            sink = %self.name,
            round_id = set.round_id,
            trigger = set.meta.trigger.as_str(),
            reference_stamp = ?set.reference_stamp,
            present = set.present_count(),
            topics = set.clouds.len(),
            processing_time_ms = set.meta.processing_time_ms,
            diagnostics = %set.meta.diagnostics.message,
            "SyncedCloudSet received"
        );

        for (output_topic, cloud) in published_clouds(set) {
            debug!(
                sink = %self.name,
                topic = %output_topic,
                points = cloud.num_points,
                stamp = cloud.stamp(),
                "synchronized cloud"
            );
        }

        for (topic, cloud) in &set.clouds {
            if cloud.is_none() {
                warn!(
                    sink = %self.name,
                    round_id = set.round_id,
                    topic = %topic,
                    "no synchronized cloud for topic, skipping publish"
                );
            }
        }
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, set),
        fields(sink = %self.name, round_id = set.round_id)
    )]
    async fn write(&mut self, set: &SyncedCloudSet) -> Result<(), ContractError> {
        self.log_round_summary(set);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::tests::sample_set;

    #[tokio::test]
    async fn test_log_sink_write() {
        let mut sink = LogSink::new("test_log");
        let result = sink.write(&sample_set(1)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_log_sink_name() {
        let sink = LogSink::new("my_logger");
        assert_eq!(sink.name(), "my_logger");
    }
}
