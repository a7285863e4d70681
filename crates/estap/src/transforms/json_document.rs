//! 📄 Plain JSON documents, one per tuple. For sinks that aren't a cluster:
//! files you can `jq` later, and the in-memory sink the tests peek into.

use std::sync::Arc;

use anyhow::Result;

use super::{BulkEntry, PlanCache, Transform};
use crate::common::{Fields, TupleBatch};
use crate::settings::EsSettings;

#[derive(Debug, Clone)]
pub(crate) struct JsonDocument {
    plans: PlanCache,
}

impl JsonDocument {
    pub(crate) fn new(projection: Option<Fields>, settings: Arc<EsSettings>) -> Self {
        Self {
            plans: PlanCache::new(projection, settings),
        }
    }
}

impl Transform for JsonDocument {
    fn transform_batch(&mut self, batch: &TupleBatch) -> Result<Vec<BulkEntry>> {
        let plan = self.plans.plan_for(&batch.fields)?;
        batch
            .entries()
            .map(|entry| {
                Ok(BulkEntry {
                    resource: None,
                    payload: plan.render(&entry)?,
                })
            })
            .collect()
    }
}
