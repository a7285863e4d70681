//! 📦 A sink that never forgets.
//!
//! Payloads are composed as JSON arrays and pushed into a shared
//! `Arc<Mutex<Vec<String>>>`. The handle lives on the config, so a test keeps a
//! clone, hands the config to a flow, and reads the evidence afterwards.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::backends::Sink;
use crate::common::Fields;
use crate::composers::{Composer, JsonArrayComposer};
use crate::progress::FlowCounters;
use crate::transforms::BulkEntry;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemorySinkConfig {
    #[serde(default)]
    pub fields: Option<Fields>,
    /// 🔒 Every composed payload, in arrival order.
    #[serde(skip)]
    pub received: Arc<Mutex<Vec<String>>>,
}

impl InMemorySinkConfig {
    pub fn new(fields: Option<Fields>) -> Self {
        Self {
            fields,
            received: Arc::default(),
        }
    }

    /// 📋 Every document received so far, flattened out of the payload arrays.
    pub async fn documents(&self) -> Result<Vec<serde_json::Value>> {
        let received = self.received.lock().await;
        let mut documents = Vec::new();
        for payload in received.iter() {
            let batch: Vec<serde_json::Value> = serde_json::from_str(payload)
                .context("💀 The in-memory sink holds a payload that isn't a JSON array")?;
            documents.extend(batch);
        }
        Ok(documents)
    }
}

#[derive(Debug)]
pub(crate) struct InMemorySink {
    received: Arc<Mutex<Vec<String>>>,
    composer: JsonArrayComposer,
    counters: Arc<FlowCounters>,
}

impl InMemorySink {
    pub(crate) fn new(config: InMemorySinkConfig, counters: Arc<FlowCounters>) -> Self {
        Self {
            received: config.received,
            composer: JsonArrayComposer,
            counters,
        }
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn send(&mut self, entries: Vec<BulkEntry>) -> Result<()> {
        let payload = self.composer.compose(&entries)?;
        self.counters.add_request(payload.len() as u64);
        self.counters.add_documents_written(entries.len() as u64);
        self.received.lock().await.push(payload);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // nothing to flush, we live in RAM
        Ok(())
    }
}
