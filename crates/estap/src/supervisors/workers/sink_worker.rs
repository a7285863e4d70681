//! 🎬 *[a channel fills with batches. somewhere, a sink waits.]*
//! *[nobody asked for this data migration. and yet, here we are.]*
//!
//! 🗑️ The SinkWorker: patient, tireless, and deeply unbothered by the chaos
//! happening upstream. It receives tuple batches, turns them into bulk entries,
//! buffers them up to `es.batch.size.entries` / `es.batch.size.bytes`, and sends.
//!
//! 🧠 Knowledge graph:
//! - Buffer limits come from the settings, not from the channel's batch size. A
//!   1000-tuple source batch can become several requests, or several source batches one.
//! - Channel closed and drained → flush the remainder → `close()` the sink.
//! - Any error closes the receiving side, so the source stops instead of reading
//!   the rest of the file into the void.
//!
//! 🦆 (the duck has no comment at this time)

use std::mem;

use anyhow::{Context, Result};
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Worker;
use crate::backends::{Sink, SinkBackend};
use crate::common::TupleBatch;
use crate::settings::EsSettings;
use crate::transforms::{BulkEntry, Transform, TupleTransformer};

#[derive(Debug)]
pub(crate) struct SinkWorker {
    id: usize,
    rx: Receiver<TupleBatch>,
    transformer: TupleTransformer,
    sink: SinkBackend,
    max_entries: usize,
    max_bytes: usize,
    buffer: Vec<BulkEntry>,
    buffered_bytes: usize,
}

impl SinkWorker {
    pub(crate) fn new(
        id: usize,
        rx: Receiver<TupleBatch>,
        transformer: TupleTransformer,
        sink: SinkBackend,
        settings: &EsSettings,
    ) -> Self {
        Self {
            id,
            rx,
            transformer,
            sink,
            max_entries: settings.batch_size_entries.max(1),
            max_bytes: settings.batch_size_bytes.max(1),
            buffer: Vec::new(),
            buffered_bytes: 0,
        }
    }

    async fn drain(&mut self) -> Result<()> {
        loop {
            match self.rx.recv().await {
                Ok(batch) => {
                    debug!("🪣 SinkWorker {} received batch of {} tuples", self.id, batch.len());
                    let entries = self
                        .transformer
                        .transform_batch(&batch)
                        .with_context(|| format!("💀 SinkWorker {} failed to transform a batch", self.id))?;
                    for entry in entries {
                        self.buffered_bytes += entry.len();
                        self.buffer.push(entry);
                        if self.buffer.len() >= self.max_entries || self.buffered_bytes >= self.max_bytes {
                            self.flush().await?;
                        }
                    }
                }
                Err(_) => {
                    debug!("🏁 SinkWorker {}: channel closed. Flushing and shutting down.", self.id);
                    self.flush().await?;
                    self.sink
                        .close()
                        .await
                        .with_context(|| format!("💀 SinkWorker {} failed to close its sink", self.id))?;
                    return Ok(());
                }
            }
        }
    }

    async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let entries = mem::take(&mut self.buffer);
        debug!(
            "📡 SinkWorker {} flushing {} entries ({} bytes)",
            self.id,
            entries.len(),
            self.buffered_bytes
        );
        self.buffered_bytes = 0;
        self.sink
            .send(entries)
            .await
            .with_context(|| format!("💀 SinkWorker {} failed to send a batch", self.id))
    }
}

impl Worker for SinkWorker {
    fn start(mut self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            let result = self.drain().await;
            if result.is_err() {
                warn!("⚠️ SinkWorker {} failed; closing the channel so the source stops", self.id);
                self.rx.close();
            }
            result
        })
    }
}
