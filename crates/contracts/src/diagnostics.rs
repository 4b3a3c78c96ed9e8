//! Diagnostics status reported once per publish.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::TopicId;

/// Summary message when every topic contributed
pub const ALL_SYNCHRONIZED_MESSAGE: &str = "all topics synchronized";
/// Summary message when at least one topic is missing
pub const PARTIALLY_SYNCHRONIZED_MESSAGE: &str = "some topics are not synchronized";

/// Overall level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    #[default]
    Ok,
    Warn,
}

/// Per-topic status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    /// Topic contributed to the most recent round
    Ok,
    /// Topic did not contribute
    Ng,
}

impl TopicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicStatus::Ok => "OK",
            TopicStatus::Ng => "NG",
        }
    }
}

/// Synchronization diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncDiagnostics {
    pub level: DiagnosticLevel,
    pub message: String,
    pub topics: BTreeMap<TopicId, TopicStatus>,
}

impl SyncDiagnostics {
    /// Build the status of `topics` given the set that did not contribute.
    pub fn from_missing<'a>(
        topics: impl IntoIterator<Item = &'a TopicId>,
        missing: &BTreeSet<TopicId>,
    ) -> Self {
        let topics: BTreeMap<TopicId, TopicStatus> = topics
            .into_iter()
            .map(|t| {
                let status = if missing.contains(t) {
                    TopicStatus::Ng
                } else {
                    TopicStatus::Ok
                };
                (t.clone(), status)
            })
            .collect();

        let (level, message) = if missing.is_empty() {
            (DiagnosticLevel::Ok, ALL_SYNCHRONIZED_MESSAGE)
        } else {
            (DiagnosticLevel::Warn, PARTIALLY_SYNCHRONIZED_MESSAGE)
        };

        Self {
            level,
            message: message.to_string(),
            topics,
        }
    }
}
