//! 📡 Elasticsearch bulk formatting: the two-line ritual.
//!
//! Each document becomes an action line and a source line:
//!
//! ```text
//! {"index":{"_index":"cascading-hadoop","_type":"artists","_id":"1"}}
//! {"name":"MALICE MIZER","url":"...","picture":"..."}
//! ```
//!
//! `update` wraps the body as `{"doc":...}`, `upsert` adds `"doc_as_upsert":true`.
//! No trailing newline here; the composer adds one per entry. The `/_bulk` endpoint
//! is very particular about that final newline and we intend to stay on its good side.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use super::{BulkEntry, PlanCache, Transform};
use crate::common::{Fields, TupleBatch};
use crate::resource::{Resource, ResourcePattern};
use crate::settings::{EsSettings, WriteOperation};

/// 📡 Tuples → bulk pairs, with per-tuple target resolution.
#[derive(Debug, Clone)]
pub(crate) struct ElasticsearchBulk {
    pattern: ResourcePattern,
    static_target: Option<Resource>,
    plans: PlanCache,
    /// 🗃️ The last resolved name and its parse. Runs of the same day or id reuse it.
    last_resolved: Option<(String, Resource)>,
}

impl ElasticsearchBulk {
    pub(crate) fn new(resource: &str, projection: Option<Fields>, settings: Arc<EsSettings>) -> Result<Self> {
        let pattern = ResourcePattern::parse(resource)?;
        let static_target = match pattern.as_static() {
            Some(fixed) => Some(Resource::parse(&fixed)?),
            None => None,
        };
        Ok(Self {
            pattern,
            static_target,
            plans: PlanCache::new(projection, settings),
            last_resolved: None,
        })
    }

    fn target_for(&mut self, entry: &crate::common::TupleEntry<'_>) -> Result<Resource> {
        if let Some(fixed) = &self.static_target {
            return Ok(fixed.clone());
        }
        let resolved = self.pattern.resolve_string(entry)?;
        if let Some((name, hit)) = &self.last_resolved
            && *name == resolved
        {
            return Ok(hit.clone());
        }
        let resource = Resource::parse(&resolved).with_context(|| {
            format!("💀 Resource pattern '{}' resolved to '{}'", self.pattern, resolved)
        })?;
        self.last_resolved = Some((resolved, resource.clone()));
        Ok(resource)
    }
}

/// 🏷️ Build the action line for one document.
pub(crate) fn action_line(operation: WriteOperation, target: &Resource, id: Option<&str>) -> Result<String> {
    let mut metadata = serde_json::Map::new();
    metadata.insert("_index".to_string(), json!(target.index()));
    if let Some(doc_type) = target.doc_type() {
        metadata.insert("_type".to_string(), json!(doc_type));
    }
    if let Some(id) = id {
        metadata.insert("_id".to_string(), json!(id));
    }
    let mut action = serde_json::Map::new();
    action.insert(operation.action().to_string(), serde_json::Value::Object(metadata));
    serde_json::to_string(&action).context("💀 The bulk action line refused to serialize. JSON describing JSON, defeated by JSON.")
}

/// 📦 Wrap the document body for the chosen operation.
pub(crate) fn source_line(operation: WriteOperation, document: String) -> String {
    match operation {
        WriteOperation::Index | WriteOperation::Create => document,
        WriteOperation::Update => format!(r#"{{"doc":{}}}"#, document),
        WriteOperation::Upsert => format!(r#"{{"doc":{},"doc_as_upsert":true}}"#, document),
    }
}

impl Transform for ElasticsearchBulk {
    fn transform_batch(&mut self, batch: &TupleBatch) -> Result<Vec<BulkEntry>> {
        let operation = self.plans.settings().write_operation;
        let plan = self.plans.plan_for(&batch.fields)?.clone();
        let mut entries = Vec::with_capacity(batch.len());
        for entry in batch.entries() {
            let target = self.target_for(&entry)?;
            let id = plan.document_id(&entry)?;
            let action = action_line(operation, &target, id.as_deref())?;
            let source = source_line(operation, plan.render(&entry)?);
            entries.push(BulkEntry {
                resource: Some(target),
                payload: format!("{}\n{}", action, source),
            });
        }
        Ok(entries)
    }
}
