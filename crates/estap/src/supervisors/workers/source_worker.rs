//! 🚰 The SourceWorker: reads batches, runs them through the pipe, feeds the channel.
//!
//! 🎬 *[the file is long. the channel is short. backpressure does the rest.]*

use std::sync::Arc;

use anyhow::{Context, Result};
use async_channel::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::Worker;
use crate::backends::{Source, SourceBackend};
use crate::common::TupleBatch;
use crate::pipes::PipePlan;
use crate::progress::FlowCounters;

#[derive(Debug)]
pub(crate) struct SourceWorker {
    tx: Sender<TupleBatch>,
    source: SourceBackend,
    plan: PipePlan,
    counters: Arc<FlowCounters>,
}

impl SourceWorker {
    pub(crate) fn new(
        tx: Sender<TupleBatch>,
        source: SourceBackend,
        plan: PipePlan,
        counters: Arc<FlowCounters>,
    ) -> Self {
        Self {
            tx,
            source,
            plan,
            counters,
        }
    }
}

impl Worker for SourceWorker {
    fn start(mut self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!("📤 SourceWorker started reading...");
            let mut batches = 0u64;
            loop {
                let next = self
                    .source
                    .next_batch()
                    .await
                    .context("💀 SourceWorker failed to read the next batch")?;
                match next {
                    Some(batch) if batch.is_empty() => continue,
                    Some(batch) => {
                        let tuples = batch.len() as u64;
                        let batch = self.plan.apply(batch);
                        self.counters.add_tuples_read(tuples);
                        batches += 1;
                        debug!("📦 SourceWorker sending batch {} ({} tuples)", batches, tuples);
                        self.tx.send(batch).await.context(
                            "💀 SourceWorker could not send: every sink worker has hung up. \
                             Check the sink errors, this is only the echo.",
                        )?;
                    }
                    None => {
                        info!("🏁 SourceWorker: source ran dry after {} batch(es). Closing the channel.", batches);
                        self.tx.close();
                        return Ok(());
                    }
                }
            }
        })
    }
}
