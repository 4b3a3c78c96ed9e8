//! Layered error definitions
//!
//! Categorized by source: config / input / frames / transform / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Input Errors =====
    /// Cloud delivered for a topic that is not configured
    #[error("unknown input topic '{topic}'")]
    UnknownTopic { topic: String },

    /// Cloud payload does not match its declared layout
    #[error("malformed cloud in frame '{frame_id}': {message}")]
    MalformedCloud { frame_id: String, message: String },

    // ===== Frame / Transform Errors =====
    /// No transform known between two frames
    #[error("cannot resolve transform from '{source_frame}' to '{target_frame}': {message}")]
    FrameLookup {
        target_frame: String,
        source_frame: String,
        message: String,
    },

    /// Transforming a topic's cloud failed
    #[error("transform failed for topic '{topic}': {message}")]
    Transform { topic: String, message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn unknown_topic(topic: impl Into<String>) -> Self {
        Self::UnknownTopic {
            topic: topic.into(),
        }
    }

    pub fn malformed_cloud(frame_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedCloud {
            frame_id: frame_id.into(),
            message: message.into(),
        }
    }

    /// Create frame lookup error
    pub fn frame_lookup(
        target_frame: impl Into<String>,
        source_frame: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::FrameLookup {
            target_frame: target_frame.into(),
            source_frame: source_frame.into(),
            message: message.into(),
        }
    }

    pub fn transform(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transform {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}
