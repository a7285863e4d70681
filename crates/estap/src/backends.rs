//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 Source backends pour tuples, sink backends slurp documents.
//! And in between, we panic! (kidding, we use anyhow)
//!
//! 🎭 This module is the casting agency. Need tuples out of a tab-separated file?
//! Out of thin air for a test? Documents into a cluster, a file, or a Vec you can
//! poke at afterwards? We've got a backend for that.
//!
//! 🧠 Knowledge graph:
//! - `Source::next_batch` yields `TupleBatch`es until `None`.
//! - `Sink::send` takes rendered `BulkEntry`s (the transform already happened in
//!   the sink worker) and owns the composing and the retrying.
//! - `SourceBackend` / `SinkBackend` are the enum dispatchers the supervisor holds,
//!   so nobody upstream cares whether the data lands in RAM, on disk, or on a cluster.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::app_config::{SinkConfig, SourceConfig};
use crate::common::TupleBatch;
use crate::progress::FlowCounters;
use crate::settings::EsSettings;
use crate::transforms::BulkEntry;

pub(crate) mod common_config;
pub mod elasticsearch;
pub mod file;
pub(crate) mod in_mem;

pub use common_config::CommonSourceConfig;
pub use elasticsearch::{ElasticsearchConnection, ElasticsearchSinkConfig};
pub use file::{FileSinkConfig, FileSourceConfig, FieldKind};
pub use in_mem::{InMemorySinkConfig, InMemorySourceConfig};

// ===== Source Trait and Backend Enum =====

/// 🚰 A source that produces tuples.
///
/// # Contract
/// - `next_batch` returns `Some(batch)` while there is data and `None` once it runs dry.
/// - Every batch of one source shares the same `Arc<Fields>`.
#[async_trait]
pub(crate) trait Source: std::fmt::Debug {
    async fn next_batch(&mut self) -> Result<Option<TupleBatch>>;
}

/// 🎭 The many faces of a Source.
#[derive(Debug)]
pub(crate) enum SourceBackend {
    InMemory(in_mem::InMemorySource),
    File(file::FileSource),
}

impl SourceBackend {
    /// 🏗️ Open whatever the config points at.
    pub(crate) async fn from_config(config: &SourceConfig) -> Result<Self> {
        Ok(match config {
            SourceConfig::InMemory(c) => Self::InMemory(in_mem::InMemorySource::new(c.clone())?),
            SourceConfig::File(c) => Self::File(file::FileSource::new(c.clone()).await?),
        })
    }
}

#[async_trait]
impl Source for SourceBackend {
    async fn next_batch(&mut self) -> Result<Option<TupleBatch>> {
        match self {
            SourceBackend::InMemory(i) => i.next_batch().await,
            SourceBackend::File(f) => f.next_batch().await,
        }
    }
}

// ===== Sink Trait and Backend Enum =====

/// 🕳️ A sink that consumes rendered documents.
///
/// # Contract
/// - `send` writes every entry or returns an error. Partial success that the sink
///   couldn't repair is an error, not a shrug.
/// - `close` flushes and finalizes. MUST be called. Skipping it is a bug, and also rude.
#[async_trait]
pub(crate) trait Sink: std::fmt::Debug {
    async fn send(&mut self, entries: Vec<BulkEntry>) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// 🎭 The many faces of a Sink. Mirrors `SourceBackend` on the other end of the pipe.
#[derive(Debug)]
pub(crate) enum SinkBackend {
    InMemory(in_mem::InMemorySink),
    File(file::FileSink),
    Elasticsearch(elasticsearch::ElasticsearchSink),
}

impl SinkBackend {
    /// 🏗️ Connect one sink. Called once per sink worker.
    pub(crate) async fn from_config(
        config: &SinkConfig,
        settings: Arc<EsSettings>,
        counters: Arc<FlowCounters>,
    ) -> Result<Self> {
        Ok(match config {
            SinkConfig::InMemory(c) => Self::InMemory(in_mem::InMemorySink::new(c.clone(), counters)),
            SinkConfig::File(c) => Self::File(file::FileSink::new(c.clone(), counters).await?),
            SinkConfig::Elasticsearch(c) => Self::Elasticsearch(
                elasticsearch::ElasticsearchSink::new(c.clone(), settings, counters).await?,
            ),
        })
    }
}

#[async_trait]
impl Sink for SinkBackend {
    async fn send(&mut self, entries: Vec<BulkEntry>) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.send(entries).await,
            SinkBackend::File(sink) => sink.send(entries).await,
            SinkBackend::Elasticsearch(sink) => sink.send(entries).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.close().await,
            SinkBackend::File(sink) => sink.close().await,
            SinkBackend::Elasticsearch(sink) => sink.close().await,
        }
    }
}
