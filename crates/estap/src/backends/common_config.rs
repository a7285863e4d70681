//! 📦 Shared source knobs: how big a batch does a source hand to the channel?
//!
//! Sink-side flushing is not configured here. The sink worker flushes on the
//! `es.batch.size.entries` / `es.batch.size.bytes` properties, same as the
//! connector always has, so there's exactly one place to tune a bulk request.

use serde::Deserialize;

/// 📦 Embedded (flattened) in every source config.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CommonSourceConfig {
    /// 📦 Max tuples per batch
    #[serde(default = "default_max_batch_size_docs")]
    pub max_batch_size_docs: usize,
    /// 📦 Max raw input bytes per batch
    #[serde(default = "default_max_batch_size_bytes")]
    pub max_batch_size_bytes: usize,
}

fn default_max_batch_size_docs() -> usize {
    1000
}

// 1 MiB of raw text per batch. Tuples are small; this mostly matters for files with essays in a column.
fn default_max_batch_size_bytes() -> usize {
    1024 * 1024
}

impl Default for CommonSourceConfig {
    fn default() -> Self {
        Self {
            max_batch_size_docs: default_max_batch_size_docs(),
            max_batch_size_bytes: default_max_batch_size_bytes(),
        }
    }
}

impl CommonSourceConfig {
    /// ✅ Zero-sized batches would spin forever without making progress.
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if self.max_batch_size_docs == 0 || self.max_batch_size_bytes == 0 {
            anyhow::bail!(
                "💀 max_batch_size_docs and max_batch_size_bytes must both be at least 1 (got {} / {})",
                self.max_batch_size_docs,
                self.max_batch_size_bytes
            );
        }
        Ok(())
    }
}
