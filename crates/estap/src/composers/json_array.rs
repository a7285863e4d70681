//! 📋 JSON array: `[doc,doc,doc]`. Entries are already valid JSON, so this is commas and brackets.

use anyhow::Result;

use super::Composer;
use crate::transforms::BulkEntry;

#[derive(Debug, Clone, Copy)]
pub(crate) struct JsonArrayComposer;

impl Composer for JsonArrayComposer {
    #[inline]
    fn compose(&self, entries: &[BulkEntry]) -> Result<String> {
        let commas = entries.len().saturating_sub(1);
        let estimated_size: usize = 2 + commas + entries.iter().map(BulkEntry::len).sum::<usize>();
        let mut payload = String::with_capacity(estimated_size);
        payload.push('[');
        for (i, entry) in entries.iter().enumerate() {
            if i > 0 {
                payload.push(',');
            }
            payload.push_str(&entry.payload);
        }
        payload.push(']');
        Ok(payload)
    }
}
