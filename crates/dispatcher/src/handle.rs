//! 每个 sink 一个有界队列和一个写入任务
//!
//! 分发端只做 `try_send`：队列满时该 sink 丢弃这一轮，其他 sink
//! 和同步器不受影响。写入失败只计数，任务继续处理下一轮。

use std::sync::Arc;

use contracts::{DataSink, SyncedCloudSet};
use observability::{SinkCounters, SinkSnapshot};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Result of offering one round to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queue full, round skipped for this sink
    Dropped,
    /// Worker already gone
    Closed,
}

/// Queue side of a running sink worker.
pub struct SinkHandle {
    counters: Arc<SinkCounters>,
    tx: mpsc::Sender<SyncedCloudSet>,
    worker: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn the worker for `sink` on the ambient runtime.
    ///
    /// A zero capacity is raised to one.
    pub fn spawn<S: DataSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let counters = Arc::new(SinkCounters::new(sink.name()));
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let worker = tokio::spawn(drain(sink, rx, Arc::clone(&counters)));
        Self {
            counters,
            tx,
            worker,
        }
    }

    pub fn name(&self) -> &str {
        self.counters.name()
    }

    pub fn counters(&self) -> SinkSnapshot {
        self.counters.snapshot()
    }

    /// Enqueue without waiting.
    pub fn offer(&self, set: SyncedCloudSet) -> Delivery {
        match self.tx.try_send(set) {
            Ok(()) => {
                self.counters
                    .set_pending(self.tx.max_capacity() - self.tx.capacity());
                Delivery::Queued
            }
            Err(TrySendError::Full(set)) => {
                self.counters.record_dropped();
                warn!(sink = %self.name(), round_id = set.round_id, "sink queue full, round dropped");
                Delivery::Dropped
            }
            Err(TrySendError::Closed(set)) => {
                error!(sink = %self.name(), round_id = set.round_id, "sink worker has stopped");
                Delivery::Closed
            }
        }
    }

    /// Close the queue, let the worker drain it, and return the final counts.
    pub async fn close(self) -> (String, SinkSnapshot) {
        let Self {
            counters,
            tx,
            worker,
        } = self;
        drop(tx);
        if let Err(e) = worker.await {
            error!(sink = %counters.name(), error = %e, "sink worker panicked");
        }
        (counters.name().to_string(), counters.snapshot())
    }
}

async fn drain<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<SyncedCloudSet>,
    counters: Arc<SinkCounters>,
) {
    debug!(sink = %counters.name(), "sink worker started");

    while let Some(set) = rx.recv().await {
        counters.set_pending(rx.len());
        let result = sink.write(&set).await;
        if let Err(e) = &result {
            error!(sink = %counters.name(), round_id = set.round_id, error = %e, "write failed");
        }
        counters.record_write(result.is_ok());
    }
    counters.set_pending(0);

    if let Err(e) = sink.flush().await {
        error!(sink = %counters.name(), error = %e, "flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %counters.name(), error = %e, "close failed on shutdown");
    }
    debug!(sink = %counters.name(), "sink worker stopped");
}
