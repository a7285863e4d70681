//! 📡 NDJSON: every entry on its own line, and the last line ends too.
//!
//! A bulk entry is already `action\nsource`, so the payload for N entries has 2N lines.
//! `/_bulk` rejects a body without the final newline, which is the one rule we
//! refuse to be creative about.

use anyhow::Result;

use super::Composer;
use crate::transforms::BulkEntry;

#[derive(Debug, Clone, Copy)]
pub(crate) struct NdjsonComposer;

impl Composer for NdjsonComposer {
    #[inline]
    fn compose(&self, entries: &[BulkEntry]) -> Result<String> {
        let estimated_size: usize = entries.iter().map(|e| e.len() + 1).sum();
        let mut payload = String::with_capacity(estimated_size);
        for entry in entries {
            payload.push_str(&entry.payload);
            payload.push('\n');
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composers::tests::entries;

    #[test]
    fn the_one_where_bulk_pairs_keep_their_trailing_newline() -> Result<()> {
        let payload = NdjsonComposer.compose(&entries(&[
            "{\"index\":{\"_index\":\"a\"}}\n{\"doc\":1}",
            "{\"index\":{\"_index\":\"a\"}}\n{\"doc\":2}",
        ]))?;
        assert_eq!(payload.lines().count(), 4);
        assert!(payload.ends_with("{\"doc\":2}\n"));
        Ok(())
    }

    #[test]
    fn the_one_where_nothing_composes_to_nothing() -> Result<()> {
        assert!(NdjsonComposer.compose(&[])?.is_empty(), "Empty input → empty output. Zen.");
        Ok(())
    }
}
