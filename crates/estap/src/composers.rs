//! 🎼 Composers: a pile of entries becomes one payload.
//!
//! 🎬 *[the buffer is full. the sink worker clears its throat.]*
//! *["Compose me," whispers the batch. "Make me one request."]*
//!
//! The transformer already rendered each tuple into its wire form. The composer
//! only decides how those strings sit next to each other on the way out.
//!
//! 🧠 Knowledge graph:
//! - **NDJSON** (`NdjsonComposer`): one entry per line, trailing `\n` included.
//!   Elasticsearch `/_bulk` insists on it; file sinks get `jq`-friendly output.
//! - **JSON Array** (`JsonArrayComposer`): `[doc,doc,doc]`. The in-memory sink keeps it
//!   around for tests that want to parse the whole thing in one `serde_json::from_str`.
//! - Each sink picks its composer: Elasticsearch and file sinks speak NDJSON, the
//!   in-memory sink keeps arrays.
//!
//! ```text
//! SinkWorker:
//!   channel(TupleBatch) → transformer → Vec<BulkEntry> → sink.send(entries) → composer.compose(&entries)
//! ```
//!
//! The sink owns its composer because a retry re-composes only the entries that
//! still need another trip.
//!
//! 🦆

pub(crate) mod json_array;
pub(crate) mod ndjson;

use anyhow::Result;

use crate::transforms::BulkEntry;

pub(crate) use json_array::JsonArrayComposer;
pub(crate) use ndjson::NdjsonComposer;

/// 🎼 Assembles rendered entries into the sink's wire format.
pub(crate) trait Composer: std::fmt::Debug {
    fn compose(&self, entries: &[BulkEntry]) -> Result<String>;
}
