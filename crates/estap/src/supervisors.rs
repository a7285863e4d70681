//! 🎬 *[a file on one side. a cluster on the other. a channel in between.]*
//! *[one worker reads. a few workers write. somebody has to wait for all of them.]*
//!
//! 📦 The Supervisor module: part middle manager, part helicopter parent.
//! It spawns the source worker and the sink workers, wires them with a bounded
//! channel, and joins them all before anyone gets to go home.
//!
//! 🧠 Knowledge graph:
//! - One source worker: reads `TupleBatch`es, runs the pipe plan, sends.
//! - `sink_parallelism` sink workers: each owns its own `SinkBackend` (its own
//!   connection) and its own `TupleTransformer`.
//! - A failing sink closes the channel, which makes the source's next send fail.
//!   That send failure is a symptom, so when both sides failed the sink's error wins.
//!
//! ⚠️ DO NOT MAKE THE WORKERS PUB. They are the supervisor's private little minions.

mod workers;

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::app_config::{RuntimeConfig, SinkConfig, SourceConfig};
use crate::backends::{SinkBackend, SourceBackend};
use crate::pipes::PipePlan;
use crate::progress::FlowCounters;
use crate::settings::EsSettings;
use crate::transforms::TupleTransformer;
use workers::{SinkWorker, SourceWorker, Worker};

/// 📦 Everything needed to run one connected flow.
#[derive(Debug)]
pub(crate) struct Supervisor {
    source_config: SourceConfig,
    sink_config: SinkConfig,
    plan: PipePlan,
    settings: Arc<EsSettings>,
    runtime: RuntimeConfig,
    counters: Arc<FlowCounters>,
}

impl Supervisor {
    pub(crate) fn new(
        source_config: SourceConfig,
        sink_config: SinkConfig,
        plan: PipePlan,
        settings: Arc<EsSettings>,
        runtime: RuntimeConfig,
        counters: Arc<FlowCounters>,
    ) -> Self {
        Self {
            source_config,
            sink_config,
            plan,
            settings,
            runtime,
            counters,
        }
    }

    /// 🧵 Open every backend, spawn every worker, wait for every worker.
    pub(crate) async fn start_workers(self) -> Result<()> {
        let source = SourceBackend::from_config(&self.source_config)
            .await
            .context("💀 The source could not be opened")?;
        let (tx, rx) = async_channel::bounded(self.runtime.queue_capacity);

        let mut sink_handles = Vec::with_capacity(self.runtime.sink_parallelism);
        for worker_id in 0..self.runtime.sink_parallelism {
            let sink = SinkBackend::from_config(&self.sink_config, self.settings.clone(), self.counters.clone())
                .await
                .with_context(|| format!("💀 Sink worker {} could not open its sink", worker_id))?;
            let transformer = TupleTransformer::from_sink_config(&self.sink_config, self.settings.clone())
                .with_context(|| format!("💀 Sink worker {} could not build its transformer", worker_id))?;
            let worker = SinkWorker::new(worker_id, rx.clone(), transformer, sink, &self.settings);
            sink_handles.push(worker.start());
        }
        // 🔒 only the workers hold receivers now, so their exit is visible to the source
        drop(rx);

        let source_handle = SourceWorker::new(tx, source, self.plan, self.counters.clone()).start();
        info!(
            "🚀 Started 1 source worker and {} sink worker(s), queue capacity {}",
            self.runtime.sink_parallelism, self.runtime.queue_capacity
        );

        let source_result = source_handle
            .await
            .context("💀 The source worker panicked")
            .and_then(|result| result);

        let mut sink_error = None;
        for (worker_id, joined) in join_all(sink_handles).await.into_iter().enumerate() {
            let result = joined
                .with_context(|| format!("💀 Sink worker {} panicked", worker_id))
                .and_then(|result| result);
            if let Err(err) = result {
                if sink_error.is_none() {
                    sink_error = Some(err);
                } else {
                    warn!("⚠️ Sink worker {} also failed: {:#}", worker_id, err);
                }
            }
        }

        match (sink_error, source_result) {
            (Some(sink_err), Err(source_err)) => {
                debug!("🔇 Source error shadowed by the sink failure: {:#}", source_err);
                Err(sink_err)
            }
            (Some(sink_err), Ok(())) => Err(sink_err),
            (None, source_result) => source_result,
        }
    }
}
