//! 📄 File sink: one JSON document per line, flushed on close.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{self, AsyncWriteExt};
use tracing::trace;

use crate::backends::Sink;
use crate::common::Fields;
use crate::composers::{Composer, NdjsonComposer};
use crate::progress::FlowCounters;
use crate::transforms::BulkEntry;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FileSinkConfig {
    pub file_name: String,
    /// 🎯 Document projection. Unset writes every field.
    #[serde(default)]
    pub fields: Option<Fields>,
}

impl FileSinkConfig {
    pub fn new(file_name: impl Into<String>, fields: Option<Fields>) -> Self {
        Self {
            file_name: file_name.into(),
            fields,
        }
    }
}

#[derive(Debug)]
pub(crate) struct FileSink {
    file_buf: io::BufWriter<File>,
    composer: NdjsonComposer,
    counters: Arc<FlowCounters>,
    sink_config: FileSinkConfig,
}

impl FileSink {
    pub(crate) async fn new(sink_config: FileSinkConfig, counters: Arc<FlowCounters>) -> Result<Self> {
        let file_handle = File::create(&sink_config.file_name).await.with_context(|| {
            format!(
                "💀 The sink file '{}' could not be conjured into existence. \
                We stared at the path. The path stared back. One of us was wrong about \
                whether the parent directory existed.",
                sink_config.file_name
            )
        })?;
        Ok(Self {
            file_buf: io::BufWriter::new(file_handle),
            composer: NdjsonComposer,
            counters,
            sink_config,
        })
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn send(&mut self, entries: Vec<BulkEntry>) -> Result<()> {
        let payload = self.composer.compose(&entries)?;
        trace!(
            "📬 {} documents ({} bytes) walked into '{}'",
            entries.len(),
            payload.len(),
            self.sink_config.file_name
        );
        self.file_buf
            .write_all(payload.as_bytes())
            .await
            .with_context(|| format!("💀 Writing to '{}' failed", self.sink_config.file_name))?;
        self.counters.add_request(payload.len() as u64);
        self.counters.add_documents_written(entries.len() as u64);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        trace!("🎬 final flush. the BufWriter empties its soul to disk");
        self.file_buf.flush().await.with_context(|| {
            format!(
                "💀 Flushing '{}' failed. The bytes are still in memory; the disk remains unwritten.",
                self.sink_config.file_name
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_documents_land_one_per_line() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.ndjson");
        let counters = Arc::new(FlowCounters::default());
        let mut sink = FileSink::new(
            FileSinkConfig {
                file_name: path.display().to_string(),
                fields: None,
            },
            counters.clone(),
        )
        .await?;
        let entries = vec![
            BulkEntry { resource: None, payload: r#"{"name":"Gackt"}"#.into() },
            BulkEntry { resource: None, payload: r#"{"name":"Versailles"}"#.into() },
        ];
        sink.send(entries).await?;
        sink.close().await?;

        let written = tokio::fs::read_to_string(&path).await?;
        assert_eq!(written, "{\"name\":\"Gackt\"}\n{\"name\":\"Versailles\"}\n");
        assert_eq!(counters.snapshot(Default::default()).documents_written, 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_missing_directory_is_reported() {
        let err = FileSink::new(
            FileSinkConfig {
                file_name: "/no/such/dir/out.ndjson".into(),
                fields: None,
            },
            Arc::new(FlowCounters::default()),
        )
        .await
        .expect_err("parent directory does not exist");
        assert!(err.to_string().contains("/no/such/dir/out.ndjson"));
    }
}
