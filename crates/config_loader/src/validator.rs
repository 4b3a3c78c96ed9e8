//! 配置校验模块
//!
//! 校验规则：
//! - 同步器参数合法 (见 `SynchronizerConfig::validate`)
//! - 静态变换的坐标系非空，且 parent != child，不重复
//! - 模拟源话题属于 input_topics，频率 > 0
//! - sink 名称非空且唯一，队列容量 > 0

use std::collections::HashSet;

use contracts::{ContractError, NodeBlueprint};

/// 校验 NodeBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &NodeBlueprint) -> Result<(), ContractError> {
    blueprint.synchronizer.validate()?;
    validate_frames(blueprint)?;
    validate_sources(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// 校验静态坐标变换
fn validate_frames(blueprint: &NodeBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, frame) in blueprint.frames.iter().enumerate() {
        if frame.parent_frame.is_empty() || frame.child_frame.is_empty() {
            return Err(ContractError::config_validation(
                format!("frames[{idx}]"),
                "parent_frame and child_frame cannot be empty",
            ));
        }
        if frame.parent_frame == frame.child_frame {
            return Err(ContractError::config_validation(
                format!("frames[{idx}]"),
                format!("frame '{}' cannot be its own parent", frame.child_frame),
            ));
        }
        if !seen.insert((frame.parent_frame.as_str(), frame.child_frame.as_str())) {
            return Err(ContractError::config_validation(
                format!("frames[{idx}]"),
                format!(
                    "duplicate transform {} -> {}",
                    frame.parent_frame, frame.child_frame
                ),
            ));
        }
    }
    Ok(())
}

/// 校验模拟数据源
fn validate_sources(blueprint: &NodeBlueprint) -> Result<(), ContractError> {
    let topics: HashSet<&str> = blueprint
        .synchronizer
        .input_topics
        .iter()
        .map(|t| t.as_str())
        .collect();

    for source in &blueprint.sources.clouds {
        if !topics.contains(source.topic.as_str()) {
            return Err(ContractError::config_validation(
                format!("sources.clouds[topic={}]", source.topic),
                "source topic is not listed in synchronizer.input_topics",
            ));
        }
        if !(source.frequency_hz > 0.0) {
            return Err(ContractError::config_validation(
                format!("sources.clouds[topic={}].frequency_hz", source.topic),
                format!("frequency_hz must be > 0, got {}", source.frequency_hz),
            ));
        }
        if source.frame_id.is_empty() {
            return Err(ContractError::config_validation(
                format!("sources.clouds[topic={}].frame_id", source.topic),
                "frame_id cannot be empty",
            ));
        }
    }

    if let Some(velocity) = &blueprint.sources.velocity {
        if !(velocity.frequency_hz > 0.0) {
            return Err(ContractError::config_validation(
                "sources.velocity.frequency_hz",
                format!("frequency_hz must be > 0, got {}", velocity.frequency_hz),
            ));
        }
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(blueprint: &NodeBlueprint) -> Result<(), ContractError> {
    let mut names = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !names.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[name={}].queue_capacity", sink.name),
                "queue_capacity must be > 0",
            ));
        }
    }
    Ok(())
}
