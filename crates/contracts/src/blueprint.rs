//! NodeBlueprint - Config Loader 输出
//!
//! 描述完整的节点配置：同步器参数、静态坐标变换、模拟数据源、输出路由。

use nalgebra::{Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{ContractError, RigidTransform, TopicId};

/// 默认速度话题
pub const DEFAULT_VELOCITY_TOPIC: &str = "/vehicle/status/velocity_status";

/// timeout_sec 上限（秒）
pub const MAX_TIMEOUT_SEC: f64 = 3600.0;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的节点配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 同步器参数
    pub synchronizer: SynchronizerConfig,

    /// 静态坐标变换 (TF 静态树)
    #[serde(default)]
    pub frames: Vec<StaticTransformConfig>,

    /// 模拟数据源 (无真实传输层时使用)
    #[serde(default)]
    pub sources: SourcesConfig,

    /// 输出路由配置
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// 同步器参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynchronizerConfig {
    /// 输出坐标系，必填且非空
    pub output_frame: String,

    /// 输入点云话题，至少两个
    pub input_topics: Vec<TopicId>,

    /// 队列深度
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// 一轮同步的最长等待时间 (秒)
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: f64,

    /// 每个话题的延迟补偿 (秒)，为空或与 input_topics 等长
    #[serde(default)]
    pub input_offset: Vec<f64>,

    /// 车速话题
    #[serde(default = "default_velocity_topic")]
    pub velocity_topic: String,
}

fn default_max_queue_size() -> usize {
    5
}

fn default_timeout_sec() -> f64 {
    0.1
}

fn default_velocity_topic() -> String {
    DEFAULT_VELOCITY_TOPIC.to_string()
}

impl SynchronizerConfig {
    /// 以默认参数创建
    pub fn new(output_frame: impl Into<String>, input_topics: Vec<TopicId>) -> Self {
        Self {
            output_frame: output_frame.into(),
            input_topics,
            max_queue_size: default_max_queue_size(),
            timeout_sec: default_timeout_sec(),
            input_offset: Vec::new(),
            velocity_topic: default_velocity_topic(),
        }
    }

    /// 校验同步器参数
    ///
    /// 规则：
    /// - output_frame 非空
    /// - input_topics 至少两个且不重复
    /// - input_offset 为空或与 input_topics 等长，每项有限且 >= 0
    /// - timeout_sec 有限，0 < timeout_sec <= [`MAX_TIMEOUT_SEC`]
    /// - max_queue_size > 0
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.output_frame.trim().is_empty() {
            return Err(ContractError::config_validation(
                "synchronizer.output_frame",
                "output_frame must be set to a non-empty frame id",
            ));
        }

        match self.input_topics.len() {
            0 => {
                return Err(ContractError::config_validation(
                    "synchronizer.input_topics",
                    "input_topics must not be empty",
                ))
            }
            1 => {
                return Err(ContractError::config_validation(
                    "synchronizer.input_topics",
                    "only one topic given, at least two topics are required",
                ))
            }
            _ => {}
        }

        let mut seen = std::collections::HashSet::new();
        for topic in &self.input_topics {
            if topic.trim().is_empty() {
                return Err(ContractError::config_validation(
                    "synchronizer.input_topics",
                    "topic name cannot be empty",
                ));
            }
            if !seen.insert(topic.as_str()) {
                return Err(ContractError::config_validation(
                    format!("synchronizer.input_topics[{topic}]"),
                    "duplicate input topic",
                ));
            }
        }

        if !self.input_offset.is_empty() && self.input_offset.len() != self.input_topics.len() {
            return Err(ContractError::config_validation(
                "synchronizer.input_offset",
                format!(
                    "the number of topics ({}) does not match the number of offsets ({})",
                    self.input_topics.len(),
                    self.input_offset.len()
                ),
            ));
        }
        for (idx, offset) in self.input_offset.iter().enumerate() {
            if !offset.is_finite() || *offset < 0.0 {
                return Err(ContractError::config_validation(
                    format!("synchronizer.input_offset[{idx}]"),
                    format!("offset must be finite and >= 0, got {offset}"),
                ));
            }
        }

        if !self.timeout_sec.is_finite() || self.timeout_sec <= 0.0 {
            return Err(ContractError::config_validation(
                "synchronizer.timeout_sec",
                format!("timeout_sec must be > 0, got {}", self.timeout_sec),
            ));
        }
        if self.timeout_sec > MAX_TIMEOUT_SEC {
            return Err(ContractError::config_validation(
                "synchronizer.timeout_sec",
                format!(
                    "timeout_sec must be <= {MAX_TIMEOUT_SEC}, got {}",
                    self.timeout_sec
                ),
            ));
        }

        if self.max_queue_size == 0 {
            return Err(ContractError::config_validation(
                "synchronizer.max_queue_size",
                "max_queue_size must be > 0",
            ));
        }

        Ok(())
    }

    /// 话题 -> 偏移；未配置偏移时为空
    pub fn offset_map(&self) -> HashMap<TopicId, f64> {
        self.input_topics
            .iter()
            .cloned()
            .zip(self.input_offset.iter().copied())
            .collect()
    }
}

/// 3D 变换：位置 + 旋转
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Transform {
    /// 位置 (x, y, z) 单位：米
    pub location: Location,

    /// 旋转 (pitch, yaw, roll) 单位：度
    pub rotation: Rotation,
}

impl Transform {
    /// 转换为刚体变换
    pub fn to_isometry(&self) -> RigidTransform {
        let rotation = UnitQuaternion::from_euler_angles(
            self.rotation.roll.to_radians(),
            self.rotation.pitch.to_radians(),
            self.rotation.yaw.to_radians(),
        );
        let translation = Translation3::new(self.location.x, self.location.y, self.location.z);
        RigidTransform::from_parts(translation, rotation)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

/// 静态坐标变换：child_frame 中的点经 transform 变换到 parent_frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticTransformConfig {
    pub parent_frame: String,
    pub child_frame: String,
    /// 缺省为单位变换
    #[serde(default)]
    pub transform: Transform,
}

/// 模拟数据源配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// 点云源
    #[serde(default)]
    pub clouds: Vec<CloudSourceConfig>,

    /// 车速源
    #[serde(default)]
    pub velocity: Option<VelocitySourceConfig>,
}

/// 模拟点云源
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSourceConfig {
    /// 发布话题，应属于 input_topics
    pub topic: TopicId,

    /// 点云坐标系
    pub frame_id: String,

    /// 发布频率 (Hz)，必须 > 0
    pub frequency_hz: f64,

    /// 每帧点数
    #[serde(default = "default_num_points")]
    pub num_points: u32,

    /// 采集到发布的延迟 (毫秒)
    #[serde(default)]
    pub latency_ms: u64,

    /// 首帧延迟 (毫秒)
    #[serde(default)]
    pub start_delay_ms: u64,

    /// 关闭后该话题永不发布 (用于验证超时路径)
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_num_points() -> u32 {
    1000
}

fn default_enabled() -> bool {
    true
}

/// 模拟车速源
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocitySourceConfig {
    /// 发布频率 (Hz)
    #[serde(default = "default_velocity_frequency")]
    pub frequency_hz: f64,

    /// 纵向速度 (m/s)
    #[serde(default)]
    pub longitudinal_velocity: f64,

    /// 横向速度 (m/s)
    #[serde(default)]
    pub lateral_velocity: f64,

    /// 横摆角速度 (rad/s)
    #[serde(default)]
    pub heading_rate: f64,
}

fn default_velocity_frequency() -> f64 {
    50.0
}

impl Default for VelocitySourceConfig {
    fn default() -> Self {
        Self {
            frequency_hz: default_velocity_frequency(),
            longitudinal_velocity: 0.0,
            lateral_velocity: 0.0,
            heading_rate: 0.0,
        }
    }
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
    /// 文件输出 (PLY + JSON)
    File,
}
