//! 📄 Document building: one tuple in, one JSON object out.
//!
//! The sink's field projection picks the columns, `es.mapping.names` renames
//! the keys, `es.mapping.exclude` drops some from the body, and `es.mapping.id`
//! points at the column that becomes `_id`. Keys come out in projection order
//! because humans read these documents too, occasionally, in tears.

use anyhow::{Context, Result, bail};

use crate::common::{Fields, TupleEntry};
use crate::settings::EsSettings;

/// 📋 A document layout compiled against one tuple schema.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DocumentPlan {
    /// 🎯 (tuple position, JSON key already escaped and quoted)
    columns: Vec<(usize, String)>,
    id_position: Option<usize>,
}

impl DocumentPlan {
    /// 🔧 Compile the projection for `fields`.
    ///
    /// `projection = None` means every field goes into the document.
    pub(crate) fn compile(
        fields: &Fields,
        projection: Option<&Fields>,
        settings: &EsSettings,
    ) -> Result<Self> {
        let selected: Vec<usize> = match projection {
            Some(projection) => fields
                .select(projection)
                .context("💀 The sink's field projection doesn't fit the incoming tuples")?,
            None => (0..fields.len()).collect(),
        };

        let mut columns = Vec::with_capacity(selected.len());
        let mut seen_keys: Vec<&str> = Vec::with_capacity(selected.len());
        for position in selected {
            let original = &fields.names()[position];
            if settings.mapping_exclude.iter().any(|excluded| excluded == original) {
                continue;
            }
            let key = settings.renamed(original).unwrap_or(original.as_str());
            if seen_keys.contains(&key) {
                bail!(
                    "💀 Two fields end up as document key '{}' after es.mapping.names. One of them has to change.",
                    key
                );
            }
            seen_keys.push(key);
            let quoted = serde_json::to_string(key)
                .with_context(|| format!("💀 Field name '{}' would not serialize as a JSON key", key))?;
            columns.push((position, quoted));
        }

        let id_position = match &settings.mapping_id {
            Some(id_field) => Some(fields.position(id_field).with_context(|| {
                format!(
                    "💀 es.mapping.id points at '{}' but the tuples only carry {}",
                    id_field, fields
                )
            })?),
            None => None,
        };

        Ok(Self {
            columns,
            id_position,
        })
    }

    /// 🆔 The `_id` for this tuple, when `es.mapping.id` is set.
    pub(crate) fn document_id(&self, entry: &TupleEntry<'_>) -> Result<Option<String>> {
        match self.id_position {
            Some(position) => {
                let id = entry
                    .tuple
                    .get(position)
                    .and_then(|value| value.as_text())
                    .with_context(|| {
                        format!(
                            "💀 The document id field '{}' is null. Documents without ids can't be updated, only regretted.",
                            entry.fields.names()[position]
                        )
                    })?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// 📝 Render the JSON body, keys in projection order.
    pub(crate) fn render(&self, entry: &TupleEntry<'_>) -> Result<String> {
        let mut body = String::with_capacity(self.columns.len() * 32 + 2);
        body.push('{');
        for (i, (position, quoted_key)) in self.columns.iter().enumerate() {
            if i > 0 {
                body.push(',');
            }
            body.push_str(quoted_key);
            body.push(':');
            let value = entry
                .tuple
                .get(*position)
                .map(|value| value.to_json())
                .unwrap_or(serde_json::Value::Null);
            let rendered = serde_json::to_string(&value).context("💀 A tuple value refused to become JSON")?;
            body.push_str(&rendered);
        }
        body.push('}');
        Ok(body)
    }
}
