//! Fan-out of synchronized rounds to the configured sinks

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace};

use contracts::{SinkConfig, SinkType, SyncedCloudSet};
use observability::SinkSnapshot;

use crate::error::DispatcherError;
use crate::handle::{Delivery, SinkHandle};
use crate::sinks::{published_clouds, FileSink, LogSink};

/// Final per-sink counters, in sink order
pub type SinkReport = Vec<(String, SinkSnapshot)>;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub sinks: Vec<SinkConfig>,
}

/// Collects configured and in-code sinks before the dispatcher starts.
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    extra_handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<SyncedCloudSet>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<SyncedCloudSet>) -> Self {
        Self {
            config,
            extra_handles: Vec::new(),
            input_rx,
        }
    }

    /// Add a sink built in code (e.g. a `ChannelSink`)
    pub fn with_handle(mut self, handle: SinkHandle) -> Self {
        self.extra_handles.push(handle);
        self
    }

    /// Open every configured sink; names must be unique across all sinks.
    #[instrument(
        name = "dispatcher_build",
        skip(self),
        fields(configured = self.config.sinks.len(), extra = self.extra_handles.len())
    )]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        let mut names = HashSet::new();
        let mut handles = Vec::with_capacity(self.config.sinks.len() + self.extra_handles.len());

        for config in &self.config.sinks {
            if !names.insert(config.name.clone()) {
                return Err(DispatcherError::DuplicateSink {
                    name: config.name.clone(),
                });
            }
            handles.push(open_sink(config)?);
        }
        for handle in self.extra_handles {
            if !names.insert(handle.name().to_string()) {
                return Err(DispatcherError::DuplicateSink {
                    name: handle.name().to_string(),
                });
            }
            handles.push(handle);
        }

        Ok(Dispatcher {
            handles,
            input_rx: self.input_rx,
        })
    }
}

fn open_sink(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    if config.queue_capacity == 0 {
        return Err(DispatcherError::ZeroCapacity {
            name: config.name.clone(),
        });
    }
    let handle = match config.sink_type {
        SinkType::Log => SinkHandle::spawn(LogSink::new(&config.name), config.queue_capacity),
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params).map_err(|source| {
                DispatcherError::SinkSetup {
                    name: config.name.clone(),
                    source,
                }
            })?;
            SinkHandle::spawn(sink, config.queue_capacity)
        }
    };
    debug!(sink = %config.name, sink_type = ?config.sink_type, capacity = config.queue_capacity, "sink opened");
    Ok(handle)
}

/// Forwards every round to all sinks without waiting on any of them.
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<SyncedCloudSet>,
}

impl Dispatcher {
    pub fn with_handles(
        handles: Vec<SinkHandle>,
        input_rx: mpsc::Receiver<SyncedCloudSet>,
    ) -> Self {
        Self { handles, input_rx }
    }

    /// Current counters of every sink
    pub fn counters(&self) -> SinkReport {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.counters()))
            .collect()
    }

    /// Run until the input channel closes, then drain every sink.
    #[instrument(name = "dispatcher_run", skip(self), fields(sinks = self.handles.len()))]
    pub async fn run(mut self) -> SinkReport {
        let mut rounds: u64 = 0;
        let mut skipped: u64 = 0;

        while let Some(set) = self.input_rx.recv().await {
            rounds += 1;
            skipped += self.fan_out(set);
        }
        info!(rounds, skipped, "dispatcher input closed, draining sinks");

        let mut report = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            report.push(handle.close().await);
        }
        report
    }

    /// Spawn [`Dispatcher::run`] as a background task
    pub fn spawn(self) -> JoinHandle<SinkReport> {
        tokio::spawn(self.run())
    }

    /// Returns how many sinks did not take the round.
    fn fan_out(&self, set: SyncedCloudSet) -> u64 {
        for (topic, _) in published_clouds(&set) {
            observability::record_cloud_published(&topic);
        }

        let Some((last, rest)) = self.handles.split_last() else {
            trace!(round_id = set.round_id, "no sinks, round discarded");
            return 0;
        };
        let mut skipped = 0;
        for handle in rest {
            if handle.offer(set.clone()) != Delivery::Queued {
                skipped += 1;
            }
        }
        if last.offer(set) != Delivery::Queued {
            skipped += 1;
        }
        skipped
    }
}

/// Build a dispatcher from sink configs only
pub fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<SyncedCloudSet>,
) -> Result<Dispatcher, DispatcherError> {
    DispatcherBuilder::new(
        DispatcherConfig {
            sinks: sink_configs,
        },
        input_rx,
    )
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::tests::sample_set;
    use crate::sinks::ChannelSink;
    use std::collections::HashMap;

    fn log_sink(name: &str, queue_capacity: usize) -> SinkConfig {
        SinkConfig {
            name: name.to_string(),
            sink_type: SinkType::Log,
            queue_capacity,
            params: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_every_sink_sees_every_round() {
        let (input_tx, input_rx) = mpsc::channel(10);
        let (out_tx, mut out_rx) = mpsc::channel(16);

        let dispatcher = DispatcherBuilder::new(
            DispatcherConfig {
                sinks: vec![log_sink("log", 10)],
            },
            input_rx,
        )
        .with_handle(SinkHandle::spawn(ChannelSink::new("channel", out_tx), 10))
        .build()
        .unwrap();
        let handle = dispatcher.spawn();

        for i in 0..5 {
            input_tx.send(sample_set(i)).await.unwrap();
        }
        drop(input_tx);

        let report = handle.await.unwrap();
        let names: Vec<&str> = report.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["log", "channel"]);
        assert!(report.iter().all(|(_, c)| c.written == 5 && c.dropped == 0));

        let mut rounds = Vec::new();
        while let Some(published) = out_rx.recv().await {
            assert_eq!(published.topic, "/lidar/top_synchronized");
            rounds.push(published.round_id);
        }
        assert_eq!(rounds, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_without_sinks_rounds_are_discarded() {
        let (input_tx, input_rx) = mpsc::channel(4);
        let handle = create_dispatcher(Vec::new(), input_rx).unwrap().spawn();
        input_tx.send(sample_set(0)).await.unwrap();
        drop(input_tx);
        assert!(handle.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let (_tx, input_rx) = mpsc::channel(1);
        let (out_tx, _out_rx) = mpsc::channel(1);
        let err = DispatcherBuilder::new(
            DispatcherConfig {
                sinks: vec![log_sink("out", 4)],
            },
            input_rx,
        )
        .with_handle(SinkHandle::spawn(ChannelSink::new("out", out_tx), 4))
        .build()
        .err()
        .unwrap();
        assert!(matches!(err, DispatcherError::DuplicateSink { ref name } if name == "out"));
    }

    #[tokio::test]
    async fn test_zero_capacity_rejected() {
        let (_tx, input_rx) = mpsc::channel(1);
        let err = create_dispatcher(vec![log_sink("log", 0)], input_rx)
            .err()
            .unwrap();
        assert!(matches!(err, DispatcherError::ZeroCapacity { .. }));
    }

    #[tokio::test]
    async fn test_file_sink_setup_failure_names_sink() {
        // base_path 指向已存在的普通文件，无法创建目录
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = log_sink("disk", 4);
        config.sink_type = SinkType::File;
        config.params.insert(
            "base_path".to_string(),
            file.path().display().to_string(),
        );

        let (_tx, input_rx) = mpsc::channel(1);
        let err = create_dispatcher(vec![config], input_rx).err().unwrap();
        assert!(matches!(err, DispatcherError::SinkSetup { ref name, .. } if name == "disk"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
