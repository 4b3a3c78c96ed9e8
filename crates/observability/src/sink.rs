//! 每个输出 sink 的计数器
//!
//! 同一份计数既供运行结束时的摘要读取，也实时上报到 Prometheus
//! （按 `sink` 标签区分）。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use metrics::{counter, gauge};

/// 计数器快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkSnapshot {
    /// 成功写入的轮数
    pub written: u64,
    /// 写入失败的轮数
    pub failed: u64,
    /// 队列已满被丢弃的轮数
    pub dropped: u64,
    /// 排队中的轮数
    pub pending: usize,
}

/// Counters of one sink, shared between its queue owner and worker task.
#[derive(Debug)]
pub struct SinkCounters {
    name: String,
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    pending: AtomicUsize,
}

impl SinkCounters {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            written: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 记录一次写入结果
    pub fn record_write(&self, ok: bool) {
        let (slot, status) = if ok {
            (&self.written, "success")
        } else {
            (&self.failed, "failure")
        };
        slot.fetch_add(1, Ordering::Relaxed);
        counter!(
            "time_syncer_sets_dispatched_total",
            "sink" => self.name.clone(),
            "status" => status
        )
        .increment(1);
    }

    /// 队列已满，本轮对该 sink 丢弃
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        counter!("time_syncer_sink_dropped_total", "sink" => self.name.clone()).increment(1);
    }

    pub fn set_pending(&self, pending: usize) {
        self.pending.store(pending, Ordering::Relaxed);
        gauge!("time_syncer_sink_queue_len", "sink" => self.name.clone()).set(pending as f64);
    }

    pub fn snapshot(&self) -> SinkSnapshot {
        SinkSnapshot {
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate_per_outcome() {
        let counters = SinkCounters::new("file");
        counters.record_write(true);
        counters.record_write(true);
        counters.record_write(false);
        counters.record_dropped();
        counters.set_pending(3);

        assert_eq!(counters.name(), "file");
        assert_eq!(
            counters.snapshot(),
            SinkSnapshot {
                written: 2,
                failed: 1,
                dropped: 1,
                pending: 3,
            }
        );
    }
}
