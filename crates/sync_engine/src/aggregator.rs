//! Per-topic round slots with an overflow buffer.
//!
//! `current` holds at most one cloud per topic for the round in progress.
//! A second arrival before the round closes lands in `overflow` and never
//! overwrites `current`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use contracts::{ContractError, PointCloud, RoundTrigger, SynchronizerConfig, TopicId};

/// Topic slot set: topic -> optional cloud
pub type TopicSlots = BTreeMap<TopicId, Option<PointCloud>>;

/// What an arrival asks of the deadline
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arrival {
    /// Every configured topic is present; close the round now.
    Complete,
    /// Still waiting. `rearm` carries a new deadline (seconds from now).
    Pending { rearm: Option<f64> },
}

/// Stream aggregator
#[derive(Debug)]
pub struct StreamAggregator {
    topics: Vec<TopicId>,
    offsets: HashMap<TopicId, f64>,
    timeout_sec: f64,
    current: TopicSlots,
    overflow: TopicSlots,
    not_synchronized: BTreeSet<TopicId>,
}

impl StreamAggregator {
    /// Build the slot maps from a validated configuration.
    ///
    /// Until the first round closes every topic counts as not synchronized.
    pub fn new(config: &SynchronizerConfig) -> Self {
        let topics = config.input_topics.clone();
        Self {
            offsets: config.offset_map(),
            timeout_sec: config.timeout_sec,
            current: empty_slots(&topics),
            overflow: empty_slots(&topics),
            not_synchronized: topics.iter().cloned().collect(),
            topics,
        }
    }

    pub fn topics(&self) -> &[TopicId] {
        &self.topics
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.current.contains_key(topic)
    }

    /// Record one arrival.
    pub fn on_arrival(&mut self, topic: &str, cloud: PointCloud) -> Result<Arrival, ContractError> {
        let slot = self
            .current
            .get_mut(topic)
            .ok_or_else(|| ContractError::unknown_topic(topic))?;

        if slot.is_some() {
            let overflow_was_empty = self.overflow.values().all(Option::is_none);
            if let Some(pending) = self.overflow.get_mut(topic) {
                *pending = Some(cloud);
            }
            let rearm = overflow_was_empty.then_some(self.timeout_sec);
            return Ok(Arrival::Pending { rearm });
        }

        *slot = Some(cloud);

        if self.current.values().all(Option::is_some) {
            return Ok(Arrival::Complete);
        }

        let rearm = if self.offsets.is_empty() {
            None
        } else {
            let offset = self.offsets.get(topic).copied().unwrap_or(0.0);
            Some(self.timeout_sec - offset)
        };
        Ok(Arrival::Pending { rearm })
    }

    /// Take the round's clouds and start the next round.
    ///
    /// On `Complete` the freshest overflow entries replace their current
    /// ones first. Afterwards non-empty overflow entries become the next
    /// round's `current` and `overflow` is cleared.
    pub fn close_round(&mut self, trigger: RoundTrigger) -> TopicSlots {
        if trigger == RoundTrigger::Complete {
            for (topic, pending) in self.overflow.iter_mut() {
                if let Some(cloud) = pending.take() {
                    self.current.insert(topic.clone(), Some(cloud));
                }
            }
        }

        let next = std::mem::replace(&mut self.overflow, empty_slots(&self.topics));
        std::mem::replace(&mut self.current, next)
    }

    /// Topics that did not contribute to the last published round.
    pub fn not_synchronized(&self) -> &BTreeSet<TopicId> {
        &self.not_synchronized
    }

    pub(crate) fn set_not_synchronized(&mut self, topics: BTreeSet<TopicId>) {
        self.not_synchronized = topics;
    }

    /// Topics still waiting for a cloud in the round in progress.
    pub fn pending_topics(&self) -> Vec<TopicId> {
        self.current
            .iter()
            .filter(|(_, cloud)| cloud.is_none())
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    /// Number of buffered overflow clouds
    pub fn overflow_len(&self) -> usize {
        self.overflow.values().filter(|c| c.is_some()).count()
    }
}

fn empty_slots(topics: &[TopicId]) -> TopicSlots {
    topics.iter().map(|t| (t.clone(), None)).collect()
}
