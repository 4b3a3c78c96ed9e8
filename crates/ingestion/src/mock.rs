//! Mock 数据源
//!
//! 用于无真实传感器环境的测试：按配置频率产生点云和车速。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    CloudSourceConfig, PointCloud, PointXYZI, TopicId, VelocitySample, VelocitySourceConfig,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::{IngestionMetrics, SourceClock};
use crate::error::{IngestionError, Result};

/// Ring radius of generated clouds (m)
const RING_RADIUS: f32 = 10.0;

/// 传输层消息
#[derive(Debug, Clone)]
pub enum InboundMessage {
    /// 点云
    Cloud { topic: TopicId, cloud: PointCloud },
    /// 车速
    Velocity(VelocitySample),
}

/// Mock 点云源
///
/// 每帧的时间戳比发送时刻早 `latency_ms`，模拟传感器延迟。
pub struct MockCloudSource {
    config: CloudSourceConfig,
    running: Arc<AtomicBool>,
}

impl MockCloudSource {
    /// 创建新的 Mock 点云源
    pub fn new(config: CloudSourceConfig) -> Result<Self> {
        if !(config.frequency_hz.is_finite() && config.frequency_hz > 0.0) {
            return Err(IngestionError::InvalidSource {
                source_name: config.topic.to_string(),
                message: format!("frequency_hz must be > 0, got {}", config.frequency_hz),
            });
        }
        Ok(Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn topic(&self) -> &TopicId {
        &self.config.topic
    }

    /// 启动 Mock 源
    ///
    /// # Errors
    /// 重复启动返回 `AlreadyRunning`
    pub fn start(
        &self,
        tx: mpsc::Sender<InboundMessage>,
        clock: SourceClock,
        metrics: Arc<IngestionMetrics>,
    ) -> Result<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(IngestionError::AlreadyRunning {
                source_name: self.config.topic.to_string(),
            });
        }

        let config = self.config.clone();
        let running = self.running.clone();

        Ok(tokio::spawn(async move {
            let period = Duration::from_secs_f64(1.0 / config.frequency_hz);
            let latency = config.latency_ms as f64 / 1000.0;
            let points = ring_points(config.num_points);

            tokio::time::sleep(Duration::from_millis(config.start_delay_ms)).await;
            let mut ticker = tokio::time::interval(period);

            debug!(
                topic = %config.topic,
                frame_id = %config.frame_id,
                frequency_hz = config.frequency_hz,
                "mock cloud source started"
            );

            let mut seq: u64 = 0;
            while running.load(Ordering::Relaxed) {
                ticker.tick().await;
                if !running.load(Ordering::Relaxed) {
                    break;
                }

                let stamp = clock.now() - latency;
                let cloud = PointCloud::from_points(stamp, config.frame_id.as_str(), &points);
                let msg = InboundMessage::Cloud {
                    topic: config.topic.clone(),
                    cloud,
                };

                if tx.send(msg).await.is_err() {
                    metrics.record_send_failure();
                    debug!(topic = %config.topic, "mock cloud channel closed");
                    break;
                }
                metrics.record_cloud();
                seq += 1;
                trace!(topic = %config.topic, seq, stamp, "mock cloud sent");
            }

            running.store(false, Ordering::SeqCst);
            debug!(topic = %config.topic, "mock cloud source stopped");
        }))
    }

    /// 停止 Mock 源
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// 检查是否正在运行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// Mock 车速源
pub struct MockVelocitySource {
    config: VelocitySourceConfig,
    running: Arc<AtomicBool>,
}

impl MockVelocitySource {
    /// 创建新的 Mock 车速源
    pub fn new(config: VelocitySourceConfig) -> Result<Self> {
        if !(config.frequency_hz.is_finite() && config.frequency_hz > 0.0) {
            return Err(IngestionError::InvalidSource {
                source_name: "velocity".to_string(),
                message: format!("frequency_hz must be > 0, got {}", config.frequency_hz),
            });
        }
        Ok(Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 启动 Mock 源
    pub fn start(
        &self,
        tx: mpsc::Sender<InboundMessage>,
        clock: SourceClock,
        metrics: Arc<IngestionMetrics>,
    ) -> Result<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(IngestionError::AlreadyRunning {
                source_name: "velocity".to_string(),
            });
        }

        let config = self.config.clone();
        let running = self.running.clone();

        Ok(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs_f64(1.0 / config.frequency_hz));

            debug!(
                frequency_hz = config.frequency_hz,
                longitudinal_velocity = config.longitudinal_velocity,
                heading_rate = config.heading_rate,
                "mock velocity source started"
            );

            while running.load(Ordering::Relaxed) {
                ticker.tick().await;
                if !running.load(Ordering::Relaxed) {
                    break;
                }

                let sample = VelocitySample {
                    stamp: clock.now(),
                    longitudinal_velocity: config.longitudinal_velocity,
                    lateral_velocity: config.lateral_velocity,
                    heading_rate: config.heading_rate,
                };

                if tx.send(InboundMessage::Velocity(sample)).await.is_err() {
                    metrics.record_send_failure();
                    debug!("mock velocity channel closed");
                    break;
                }
                metrics.record_velocity();
            }

            running.store(false, Ordering::SeqCst);
            debug!("mock velocity source stopped");
        }))
    }

    /// 停止 Mock 源
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// 检查是否正在运行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// Points evenly spread on a horizontal ring around the sensor.
fn ring_points(num_points: u32) -> Vec<PointXYZI> {
    let n = num_points.max(1) as f32;
    (0..num_points)
        .map(|i| {
            let angle = i as f32 / n * std::f32::consts::TAU;
            PointXYZI {
                x: RING_RADIUS * angle.cos(),
                y: RING_RADIUS * angle.sin(),
                z: 0.0,
                intensity: (i % 256) as f32,
            }
        })
        .collect()
}
