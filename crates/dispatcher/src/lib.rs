//! # Dispatcher
//!
//! 同步结果分发模块。
//!
//! 负责：
//! - 消费 `SyncedCloudSet`
//! - 每个点云以 `<input_topic>_synchronized` 发布
//! - Fan-out 到多个 sinks
//! - 隔离慢 sink，不阻塞同步引擎

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod sinks;

pub use contracts::{DataSink, SyncedCloudSet};
pub use dispatcher::{
    create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig, SinkReport,
};
pub use error::DispatcherError;
pub use handle::{Delivery, SinkHandle};
pub use observability::SinkSnapshot;
pub use sinks::{published_clouds, ChannelSink, FileSink, LogSink, PublishedCloud};
