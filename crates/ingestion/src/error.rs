//! Ingestion 错误类型

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 数据源配置无效
    #[error("invalid source {source_name}: {message}")]
    InvalidSource {
        /// 数据源名（topic 或 velocity）
        source_name: String,
        /// 错误消息
        message: String,
    },

    /// 通道已关闭
    #[error("channel closed for source {source_name}")]
    ChannelClosed {
        /// 数据源名
        source_name: String,
    },

    /// 数据源已在运行
    #[error("source {source_name} is already running")]
    AlreadyRunning {
        /// 数据源名
        source_name: String,
    },
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
