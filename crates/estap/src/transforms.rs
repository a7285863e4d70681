//! 🔄 Transforms: tuples in, wire-ready entries out.
//!
//! 🎬 The tuple has been read, piped, renamed. It stands at the edge of the
//! sink worker like a skydiver at an open door. This module packs its parachute:
//! a JSON document, maybe an `_id`, maybe a resolved target, and for Elasticsearch
//! an action line on top.
//!
//! ```text
//!   TupleBatch ──▶ DocumentPlan (projection, es.mapping.*) ──▶ BulkEntry { resource, payload }
//!                     │
//!                     ├─ ElasticsearchBulk: "{action}\n{doc}"      (ES sink)
//!                     └─ JsonDocument:      "{doc}"                (file + in-memory sinks)
//! ```
//!
//! 🧠 Knowledge graph:
//! - Trait → concrete impls → enum dispatcher → `from_sink_config`, the same shape as
//!   backends and composers.
//! - The document plan is compiled once per schema and cached; batches from the same
//!   source share an `Arc<Fields>`, so the cache check is a pointer compare.
//! - Entries keep their resolved `Resource` so the ES sink can check index existence
//!   and refresh exactly what it touched.

pub(crate) mod document;
pub(crate) mod elasticsearch;
pub(crate) mod json_document;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::app_config::SinkConfig;
use crate::common::{Fields, TupleBatch};
use crate::resource::Resource;
use crate::settings::EsSettings;
use document::DocumentPlan;

pub(crate) use elasticsearch::ElasticsearchBulk;
pub(crate) use json_document::JsonDocument;

/// 📦 One document, rendered in the sink's wire format, plus where it's headed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BulkEntry {
    pub resource: Option<Resource>,
    pub payload: String,
}

impl BulkEntry {
    pub(crate) fn len(&self) -> usize {
        self.payload.len()
    }
}

/// 🔄 Turns a batch of tuples into sink entries.
pub(crate) trait Transform {
    fn transform_batch(&mut self, batch: &TupleBatch) -> Result<Vec<BulkEntry>>;
}

/// 🗃️ Remembers the last compiled plan so a schema is compiled once, not once per batch.
#[derive(Debug, Clone)]
pub(crate) struct PlanCache {
    projection: Option<Fields>,
    settings: Arc<EsSettings>,
    compiled: Option<(Arc<Fields>, DocumentPlan)>,
}

impl PlanCache {
    pub(crate) fn new(projection: Option<Fields>, settings: Arc<EsSettings>) -> Self {
        Self {
            projection,
            settings,
            compiled: None,
        }
    }

    pub(crate) fn settings(&self) -> &EsSettings {
        &self.settings
    }

    pub(crate) fn plan_for(&mut self, fields: &Arc<Fields>) -> Result<&DocumentPlan> {
        let stale = match &self.compiled {
            Some((cached, _)) => !(Arc::ptr_eq(cached, fields) || cached == fields),
            None => true,
        };
        if stale {
            let plan = DocumentPlan::compile(fields, self.projection.as_ref(), &self.settings)?;
            self.compiled = Some((fields.clone(), plan));
        }
        self.compiled
            .as_ref()
            .map(|(_, plan)| plan)
            .context("💀 The document plan vanished between compiling and using it. Spooky.")
    }
}

/// 🎭 The polymorphic transformer, resolved from where the data is going.
#[derive(Debug, Clone)]
pub(crate) enum TupleTransformer {
    ElasticsearchBulk(ElasticsearchBulk),
    JsonDocument(JsonDocument),
}

impl TupleTransformer {
    /// 🔧 Elasticsearch gets bulk pairs; files and memory get bare documents.
    pub(crate) fn from_sink_config(sink: &SinkConfig, settings: Arc<EsSettings>) -> Result<Self> {
        Ok(match sink {
            SinkConfig::Elasticsearch(es) => Self::ElasticsearchBulk(ElasticsearchBulk::new(
                &es.resource,
                es.fields.clone(),
                settings,
            )?),
            SinkConfig::File(file) => {
                Self::JsonDocument(JsonDocument::new(file.fields.clone(), settings))
            }
            SinkConfig::InMemory(mem) => {
                Self::JsonDocument(JsonDocument::new(mem.fields.clone(), settings))
            }
        })
    }
}

impl Transform for TupleTransformer {
    fn transform_batch(&mut self, batch: &TupleBatch) -> Result<Vec<BulkEntry>> {
        match self {
            Self::ElasticsearchBulk(t) => t.transform_batch(batch),
            Self::JsonDocument(t) => t.transform_batch(batch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemorySinkConfig;
    use crate::backends::elasticsearch::ElasticsearchSinkConfig;
    use crate::common::Tuple;

    fn batch() -> Result<TupleBatch> {
        TupleBatch::new(
            Arc::new(Fields::new(["id", "name", "url", "picture", "ts"])?),
            vec![
                Tuple::from_iter(["1", "MALICE MIZER", "u1", "p1", "2012-10-06T19:20:25.000Z"]),
                Tuple::from_iter(["12", "Gackt", "u12", "p12", "2011-03-01T10:00:00.000Z"]),
            ],
        )
    }

    #[test]
    fn the_one_where_the_es_sink_gets_bulk_pairs() -> Result<()> {
        let sink = SinkConfig::Elasticsearch(ElasticsearchSinkConfig::new(
            "cascading-hadoop/pattern-{id}",
            Some(Fields::new(["id", "name", "url", "picture"])?),
        ));
        let mut transformer = TupleTransformer::from_sink_config(&sink, Arc::new(EsSettings::default()))?;
        let entries = transformer.transform_batch(&batch()?)?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].resource.as_ref().map(|r| r.label()), Some("pattern-12"));
        assert_eq!(entries[1].payload.lines().count(), 2);
        Ok(())
    }

    #[test]
    fn the_one_where_memory_gets_plain_documents() -> Result<()> {
        let sink = SinkConfig::InMemory(InMemorySinkConfig::default());
        let mut transformer = TupleTransformer::from_sink_config(&sink, Arc::new(EsSettings::default()))?;
        let entries = transformer.transform_batch(&batch()?)?;
        assert_eq!(entries[0].resource, None);
        assert!(entries[0].payload.starts_with(r#"{"id":"1","name":"MALICE MIZER""#));
        Ok(())
    }

    #[test]
    fn the_one_where_the_plan_is_compiled_once_per_schema() -> Result<()> {
        let batch = batch()?;
        let mut cache = PlanCache::new(None, Arc::new(EsSettings::default()));
        let first = cache.plan_for(&batch.fields)?.clone();
        let second = cache.plan_for(&batch.fields)?.clone();
        assert_eq!(first, second);

        let other = Arc::new(Fields::new(["only"])?);
        let third = cache.plan_for(&other)?.clone();
        assert_ne!(first, third);
        Ok(())
    }
}
