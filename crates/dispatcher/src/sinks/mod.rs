//! Sink implementations
//!
//! Contains LogSink, FileSink, and ChannelSink.

mod channel;
mod file;
mod log;

use contracts::{synchronized_topic, PointCloud, SyncedCloudSet};

pub use self::channel::{ChannelSink, PublishedCloud};
pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;

/// Present clouds of `set` paired with their output topic.
///
/// Topics without a cloud this round publish nothing.
pub fn published_clouds(set: &SyncedCloudSet) -> impl Iterator<Item = (String, &PointCloud)> {
    set.clouds
        .iter()
        .filter_map(|(topic, cloud)| cloud.as_ref().map(|c| (synchronized_topic(topic), c)))
}
