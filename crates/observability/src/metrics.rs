//! Time Synchronizer 指标收集模块
//!
//! 基于 `SyncedCloudSet` 收集和统计同步轮次的运行指标。

use std::collections::BTreeMap;

use contracts::{RoundTrigger, SyncedCloudSet, TopicStatus};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

/// 向已安装的 recorder 注册指标说明
pub fn describe_metrics() {
    describe_counter!("time_syncer_rounds_total", "Published rounds by trigger");
    describe_histogram!(
        "time_syncer_processing_time_ms",
        Unit::Milliseconds,
        "Time from round close to publish"
    );
    describe_histogram!(
        "time_syncer_cyclic_time_ms",
        Unit::Milliseconds,
        "Wall time between consecutive publishes"
    );
    describe_gauge!("time_syncer_topic_status", "1 when the topic made the last round");
    describe_counter!(
        "time_syncer_clouds_rejected_total",
        "Clouds refused on arrival by reason"
    );
    describe_counter!(
        "time_syncer_compensation_truncated_total",
        "Motion integrations cut short by a velocity gap"
    );
    describe_counter!(
        "time_syncer_output_dropped_total",
        "Rounds dropped because the synchronizer output queue was full"
    );
    describe_counter!(
        "time_syncer_sink_dropped_total",
        "Rounds a sink skipped because its queue was full"
    );
    describe_gauge!("time_syncer_sink_queue_len", "Rounds waiting in a sink queue");
}

/// 从 SyncedCloudSet 记录指标
///
/// 每次发布一轮同步结果时调用此函数。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_round_metrics;
///
/// while let Some(set) = output_rx.recv().await {
///     record_round_metrics(&set);
///     // ...
/// }
/// ```
pub fn record_round_metrics(set: &SyncedCloudSet) {
    let meta = &set.meta;

    counter!("time_syncer_rounds_total", "trigger" => meta.trigger.as_str()).increment(1);
    gauge!("time_syncer_last_round_id").set(set.round_id as f64);

    // 处理耗时 / 周期
    histogram!("time_syncer_processing_time_ms").record(meta.processing_time_ms);
    histogram!("time_syncer_cyclic_time_ms").record(meta.cyclic_time_ms);

    let missing = meta.missing_topics.len() + meta.failed_topics.len();
    gauge!("time_syncer_topics_missing").set(missing as f64);

    for (topic, status) in &meta.diagnostics.topics {
        let value = match status {
            TopicStatus::Ok => 1.0,
            TopicStatus::Ng => 0.0,
        };
        gauge!("time_syncer_topic_status", "topic" => topic.to_string()).set(value);
        if *status == TopicStatus::Ng {
            counter!("time_syncer_topic_missing_total", "topic" => topic.to_string())
                .increment(1);
        }
    }

    for topic in &meta.failed_topics {
        counter!("time_syncer_transform_failures_total", "topic" => topic.to_string())
            .increment(1);
    }
}

/// 记录点云接收
pub fn record_cloud_received(topic: &str) {
    counter!(
        "time_syncer_clouds_received_total",
        "topic" => topic.to_string()
    )
    .increment(1);
}

/// 记录被拒绝的点云（格式错误 / 未知 topic）
pub fn record_cloud_rejected(topic: &str, reason: &'static str) {
    counter!(
        "time_syncer_clouds_rejected_total",
        "topic" => topic.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// 记录速度样本接收
pub fn record_velocity_received() {
    counter!("time_syncer_velocity_samples_total").increment(1);
}

/// 记录运动补偿积分因数据稀疏被截断
pub fn record_compensation_truncated() {
    counter!("time_syncer_compensation_truncated_total").increment(1);
}

/// 记录输出队列已满导致的丢弃
pub fn record_output_dropped() {
    counter!("time_syncer_output_dropped_total").increment(1);
}

/// 记录输出 topic 的点云发布
pub fn record_cloud_published(output_topic: &str) {
    counter!(
        "time_syncer_clouds_published_total",
        "topic" => output_topic.to_string()
    )
    .increment(1);
}

/// 轮次指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct RoundMetricsAggregator {
    /// 总轮数
    pub total_rounds: u64,

    /// 全部到齐触发的轮数
    pub complete_rounds: u64,

    /// 超时触发的轮数
    pub timeout_rounds: u64,

    /// 没有任何点云的轮数
    pub empty_rounds: u64,

    /// 有缺失 topic 的轮数
    pub rounds_with_missing: u64,

    /// 变换失败总数
    pub transform_failures: u64,

    /// 处理耗时统计 (ms)
    pub processing_stats: RunningStats,

    /// 周期统计 (ms)
    pub cyclic_stats: RunningStats,

    /// 各 topic 缺失次数
    pub missing_counts: BTreeMap<String, u64>,
}

impl RoundMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, set: &SyncedCloudSet) {
        let meta = &set.meta;
        self.total_rounds += 1;
        match meta.trigger {
            RoundTrigger::Complete => self.complete_rounds += 1,
            RoundTrigger::Timeout => self.timeout_rounds += 1,
        }
        if set.is_empty() {
            self.empty_rounds += 1;
        }

        self.transform_failures += meta.failed_topics.len() as u64;

        let absent: Vec<&contracts::TopicId> = set
            .clouds
            .iter()
            .filter(|(_, cloud)| cloud.is_none())
            .map(|(topic, _)| topic)
            .collect();
        if !absent.is_empty() {
            self.rounds_with_missing += 1;
            for topic in absent {
                *self.missing_counts.entry(topic.to_string()).or_insert(0) += 1;
            }
        }

        self.processing_stats.push(meta.processing_time_ms);
        // 首轮没有周期
        if self.total_rounds > 1 {
            self.cyclic_stats.push(meta.cyclic_time_ms);
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_rounds: self.total_rounds,
            complete_rounds: self.complete_rounds,
            timeout_rounds: self.timeout_rounds,
            empty_rounds: self.empty_rounds,
            rounds_with_missing: self.rounds_with_missing,
            transform_failures: self.transform_failures,
            timeout_rate: percentage(self.timeout_rounds, self.total_rounds),
            missing_rate: percentage(self.rounds_with_missing, self.total_rounds),
            processing_time_ms: self.processing_stats.summary(),
            cyclic_time_ms: self.cyclic_stats.summary(),
            topic_missing_counts: self.missing_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_rounds: u64,
    pub complete_rounds: u64,
    pub timeout_rounds: u64,
    pub empty_rounds: u64,
    pub rounds_with_missing: u64,
    pub transform_failures: u64,
    pub timeout_rate: f64,
    pub missing_rate: f64,
    pub processing_time_ms: StatsSummary,
    pub cyclic_time_ms: StatsSummary,
    pub topic_missing_counts: BTreeMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Time Sync Metrics Summary ===")?;
        writeln!(f, "Total rounds: {}", self.total_rounds)?;
        writeln!(f, "Complete rounds: {}", self.complete_rounds)?;
        writeln!(
            f,
            "Timeout rounds: {} ({:.2}%)",
            self.timeout_rounds, self.timeout_rate
        )?;
        writeln!(f, "Empty rounds: {}", self.empty_rounds)?;
        writeln!(
            f,
            "Rounds with missing topics: {} ({:.2}%)",
            self.rounds_with_missing, self.missing_rate
        )?;
        writeln!(f, "Transform failures: {}", self.transform_failures)?;
        writeln!(f, "Processing time (ms): {}", self.processing_time_ms)?;
        writeln!(f, "Cyclic time (ms): {}", self.cyclic_time_ms)?;

        if !self.topic_missing_counts.is_empty() {
            writeln!(f, "Missing topic counts:")?;
            for (topic, count) in &self.topic_missing_counts {
                writeln!(f, "  {}: {}", topic, count)?;
            }
        }

        Ok(())
    }
}

/// 一组耗时样本的摘要；`count == 0` 时显示为 `N/A`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            return f.write_str("N/A");
        }
        write!(
            f,
            "mean {:.3} ± {:.3}, range [{:.3}, {:.3}], n={}",
            self.mean, self.std_dev, self.min, self.max, self.count
        )
    }
}

/// Streaming mean / sample variance (Welford) with min and max.
///
/// Non-finite samples are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;
        if self.count == 1 {
            (self.min, self.max) = (value, value);
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance; 0 below two samples
    pub fn variance(&self) -> f64 {
        match self.count {
            0 | 1 => 0.0,
            n => self.m2 / (n - 1) as f64,
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: self.mean,
            std_dev: self.std_dev(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{RoundMeta, TopicId};

    fn round(id: u64, trigger: RoundTrigger, present: &[&str], absent: &[&str]) -> SyncedCloudSet {
        let mut clouds = BTreeMap::new();
        for topic in present {
            clouds.insert(
                TopicId::from(*topic),
                Some(contracts::PointCloud::from_points(1.0, "base_link", &[])),
            );
        }
        for topic in absent {
            clouds.insert(TopicId::from(*topic), None);
        }
        SyncedCloudSet {
            round_id: id,
            reference_stamp: Some(1.0),
            frame_id: "base_link".to_string(),
            clouds,
            meta: RoundMeta {
                trigger,
                missing_topics: absent.iter().map(|t| TopicId::from(*t)).collect(),
                processing_time_ms: 0.5,
                cyclic_time_ms: 100.0,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_running_stats_ignores_non_finite() {
        let mut stats = RunningStats::default();
        assert_eq!(stats.summary().to_string(), "N/A");

        for value in [4.0, f64::NAN, 2.0, 5.0, f64::INFINITY, 1.0, 3.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
        assert_eq!((stats.min(), stats.max()), (1.0, 5.0));
        assert!(stats.summary().to_string().ends_with("n=5"));
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = RoundMetricsAggregator::new();

        aggregator.update(&round(0, RoundTrigger::Complete, &["/a", "/b"], &[]));
        aggregator.update(&round(1, RoundTrigger::Timeout, &["/a"], &["/b"]));
        aggregator.update(&round(2, RoundTrigger::Timeout, &[], &["/a", "/b"]));

        assert_eq!(aggregator.total_rounds, 3);
        assert_eq!(aggregator.complete_rounds, 1);
        assert_eq!(aggregator.timeout_rounds, 2);
        assert_eq!(aggregator.empty_rounds, 1);
        assert_eq!(aggregator.rounds_with_missing, 2);
        assert_eq!(aggregator.missing_counts.get("/b"), Some(&2));
        assert_eq!(aggregator.missing_counts.get("/a"), Some(&1));
        assert_eq!(aggregator.cyclic_stats.count(), 2);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = RoundMetricsAggregator::new();
        for id in 0..4 {
            aggregator.update(&round(id, RoundTrigger::Complete, &["/a", "/b"], &[]));
        }
        aggregator.update(&round(4, RoundTrigger::Timeout, &["/a"], &["/b"]));

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Total rounds: 5"));
        assert!(output.contains("Timeout rounds: 1 (20.00%)"));
        assert!(output.contains("/b: 1"));
    }
}
