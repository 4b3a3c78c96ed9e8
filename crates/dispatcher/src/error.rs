//! Dispatcher setup errors
//!
//! 运行期的写入失败只计数不上抛，这里只有建立 sink 时的错误。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sink could not prepare its output (e.g. create the file sink directory)
    #[error("sink '{name}' could not be created")]
    SinkSetup {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// A zero-length queue cannot hold a single round
    #[error("sink '{name}' needs queue_capacity > 0")]
    ZeroCapacity { name: String },

    /// Two sinks with one name would share counters and output paths
    #[error("duplicate sink name '{name}'")]
    DuplicateSink { name: String },
}
