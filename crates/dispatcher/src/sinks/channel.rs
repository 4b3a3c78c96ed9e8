//! ChannelSink - republishes every synchronized cloud on an output channel

use contracts::{ContractError, DataSink, PointCloud, SyncedCloudSet};
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use super::published_clouds;

/// One cloud published on its output topic
#[derive(Debug, Clone)]
pub struct PublishedCloud {
    /// `<input_topic>_synchronized`
    pub topic: String,
    pub round_id: u64,
    pub cloud: PointCloud,
}

/// Sink that forwards present clouds to a downstream consumer.
///
/// This is the in-process stand-in for the per-topic output publishers.
pub struct ChannelSink {
    name: String,
    tx: mpsc::Sender<PublishedCloud>,
}

impl ChannelSink {
    pub fn new(name: impl Into<String>, tx: mpsc::Sender<PublishedCloud>) -> Self {
        Self {
            name: name.into(),
            tx,
        }
    }
}

impl DataSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "channel_sink_write",
        skip(self, set),
        fields(sink = %self.name, round_id = set.round_id)
    )]
    async fn write(&mut self, set: &SyncedCloudSet) -> Result<(), ContractError> {
        for (topic, cloud) in published_clouds(set) {
            let published = PublishedCloud {
                topic,
                round_id: set.round_id,
                cloud: cloud.clone(),
            };
            self.tx
                .send(published)
                .await
                .map_err(|_| ContractError::sink_write(&self.name, "output channel closed"))?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, "ChannelSink closed");
        Ok(())
    }
}
