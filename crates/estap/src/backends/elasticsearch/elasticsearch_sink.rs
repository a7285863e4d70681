//! 📡 Elasticsearch sink: bulk writes that know when to try again.
//!
//! 🎬 *[a payload leaves the building. the cluster is busy. the cluster says 429.]*
//! *["Come back in ten seconds," it says. We do. We always do.]*
//!
//! Per `send`:
//! 1. typed targets are refused on clusters without mapping types (7.0+),
//! 2. with `es.index.auto.create = no`, each new index is checked for existence once,
//! 3. the entries are composed as NDJSON and POSTed to `/_bulk`,
//! 4. a throttled request (429/503) retries whole; 429 items retry alone; any other
//!    failed item fails the flow with its reasons,
//! 5. after `es.batch.write.retry.count` extra rounds, we give up loudly.
//!
//! `close` refreshes every index this sink touched, unless `es.batch.write.refresh = false`.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::rest_client::{BulkOutcome, RestClient};
use super::ElasticsearchSinkConfig;
use crate::backends::Sink;
use crate::composers::{Composer, NdjsonComposer};
use crate::progress::FlowCounters;
use crate::resource::ResourcePattern;
use crate::settings::{ES_BATCH_WRITE_RETRY_COUNT, ES_INDEX_AUTO_CREATE, EsSettings};
use crate::transforms::BulkEntry;

/// 🔢 How many failure reasons make it into the error message.
const MAX_REPORTED_FAILURES: usize = 5;

#[derive(Debug)]
pub(crate) struct ElasticsearchSink {
    client: RestClient,
    settings: Arc<EsSettings>,
    composer: NdjsonComposer,
    counters: Arc<FlowCounters>,
    supports_types: bool,
    /// 🗂️ Indices written to, for the refresh on close.
    touched: BTreeSet<String>,
    /// ✅ Indices already confirmed to exist (only tracked when auto-create is off).
    verified: BTreeSet<String>,
    sink_config: ElasticsearchSinkConfig,
}

impl ElasticsearchSink {
    pub(crate) async fn new(
        sink_config: ElasticsearchSinkConfig,
        settings: Arc<EsSettings>,
        counters: Arc<FlowCounters>,
    ) -> Result<Self> {
        let connection = sink_config.connection.clone().with_settings(&settings);
        let client = RestClient::new(connection)?;
        let info = client.cluster_info().await.context(
            "💀 The Elasticsearch sink could not say hello to the cluster. Check that it's running \
            and that the url (or es.nodes) points at it.",
        )?;
        let supports_types = info.supports_types()?;
        info!(
            "📡 Connected to '{}' (Elasticsearch {}), writing to '{}'",
            client.url(),
            info.version.number,
            sink_config.resource
        );

        let pattern = ResourcePattern::parse(&sink_config.resource)?;
        if pattern.is_typed() && !supports_types {
            bail!(
                "💀 Resource '{}' names a mapping type, but Elasticsearch {} removed types. \
                Drop the '/type' part and write to the index alone.",
                sink_config.resource,
                info.version.number
            );
        }

        Ok(Self {
            client,
            settings,
            composer: NdjsonComposer,
            counters,
            supports_types,
            touched: BTreeSet::new(),
            verified: BTreeSet::new(),
            sink_config,
        })
    }

    /// 🚦 Every target must be writable before any byte goes out.
    async fn check_targets(&mut self, entries: &[BulkEntry]) -> Result<()> {
        for resource in entries.iter().filter_map(|entry| entry.resource.as_ref()) {
            if resource.is_typed() && !self.supports_types {
                bail!(
                    "💀 '{}' resolved to a typed resource, but this cluster has no mapping types",
                    resource
                );
            }
            if self.settings.index_auto_create || self.verified.contains(resource.index()) {
                continue;
            }
            if !self.client.index_exists(resource.index()).await? {
                bail!(
                    "💀 Index '{}' does not exist and {} is 'no', so we won't create it by writing to it",
                    resource.index(),
                    ES_INDEX_AUTO_CREATE
                );
            }
            self.verified.insert(resource.index().to_string());
        }
        Ok(())
    }

    fn record_written(&mut self, entries: &[BulkEntry]) {
        for resource in entries.iter().filter_map(|entry| entry.resource.as_ref()) {
            if !self.touched.contains(resource.index()) {
                self.touched.insert(resource.index().to_string());
                self.counters.touch_index(resource.index());
            }
        }
        self.counters.add_documents_written(entries.len() as u64);
    }
}

#[async_trait]
impl Sink for ElasticsearchSink {
    async fn send(&mut self, entries: Vec<BulkEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.check_targets(&entries).await?;

        let mut pending = entries;
        let mut retries = 0u32;
        loop {
            let payload = self.composer.compose(&pending)?;
            self.counters.add_request(payload.len() as u64);
            debug!("📡 Sending {} documents ({} bytes) to /_bulk", pending.len(), payload.len());

            let to_retry = match self.client.bulk(payload).await? {
                BulkOutcome::Throttled { status, body } => {
                    warn!("🐢 /_bulk answered {} for the whole request: {}", status, body);
                    pending
                }
                BulkOutcome::Completed(response) if !response.errors => {
                    self.record_written(&pending);
                    return Ok(());
                }
                BulkOutcome::Completed(response) => {
                    let items = response.into_items();
                    if items.len() != pending.len() {
                        bail!(
                            "💀 Sent {} documents, but /_bulk reported on {}. We can't tell who made it.",
                            pending.len(),
                            items.len()
                        );
                    }
                    let mut written = Vec::new();
                    let mut rejected = Vec::new();
                    let mut failures = Vec::new();
                    for (entry, item) in pending.into_iter().zip(items) {
                        match item {
                            Some(item) if item.rejected() => rejected.push(entry),
                            Some(item) if item.failed() => failures.push(item.reason()),
                            Some(_) => written.push(entry),
                            None => failures.push("empty bulk item".to_string()),
                        }
                    }
                    self.record_written(&written);
                    if !failures.is_empty() {
                        bail!(
                            "💀 Elasticsearch rejected {} document(s): {}",
                            failures.len(),
                            failures
                                .iter()
                                .take(MAX_REPORTED_FAILURES)
                                .cloned()
                                .collect::<Vec<_>>()
                                .join("; ")
                        );
                    }
                    if rejected.is_empty() {
                        return Ok(());
                    }
                    warn!("🐢 {} document(s) were rejected with 429", rejected.len());
                    rejected
                }
            };

            if retries >= self.settings.retry_count {
                bail!(
                    "💀 Gave up on {} document(s) after {} retries ({}). The cluster stayed too busy.",
                    to_retry.len(),
                    retries,
                    ES_BATCH_WRITE_RETRY_COUNT
                );
            }
            retries += 1;
            self.counters.add_retry();
            warn!(
                "🔁 Retry {}/{} for {} document(s) in {:?}",
                retries,
                self.settings.retry_count,
                to_retry.len(),
                self.settings.retry_wait
            );
            tokio::time::sleep(self.settings.retry_wait).await;
            pending = to_retry;
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.settings.refresh_after_write || self.touched.is_empty() {
            debug!("🗑️ Elasticsearch sink for '{}' closing, nothing to refresh", self.sink_config.resource);
            return Ok(());
        }
        self.client
            .refresh(&self.touched)
            .await
            .context("💀 The documents were written, but the refresh afterwards failed")
    }
}
