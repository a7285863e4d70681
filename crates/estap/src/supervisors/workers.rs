//! 🧵 Workers: the ones who actually do the work while the Supervisor takes the credit.
//!
//! 🚀 Two kinds. The source worker reads and pipes; the sink workers transform,
//! buffer and send. They only ever talk through the channel.

use anyhow::Result;
use tokio::task::JoinHandle;

mod sink_worker;
mod source_worker;

pub(crate) use sink_worker::SinkWorker;
pub(crate) use source_worker::SourceWorker;

/// 🏗️ A background worker, that does work. duh.
pub(crate) trait Worker {
    /// 🚀 Start the worker. Returns a JoinHandle because we trust but verify.
    /// Mostly verify.
    fn start(self) -> JoinHandle<Result<()>>;
}
