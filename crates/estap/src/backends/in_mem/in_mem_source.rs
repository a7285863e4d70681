//! 📦 Rows from the config, handed out in batches. No file, no disk, no excuses.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::backends::{CommonSourceConfig, Source};
use crate::common::{Fields, Tuple, TupleBatch};

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct InMemorySourceConfig {
    pub fields: Fields,
    /// 📋 Every row as text, one cell per field.
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    #[serde(flatten, default)]
    pub common_config: CommonSourceConfig,
}

impl InMemorySourceConfig {
    pub fn new<R, C>(fields: Fields, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            fields,
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
            common_config: CommonSourceConfig::default(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct InMemorySource {
    fields: Arc<Fields>,
    rows: VecDeque<Tuple>,
    batch_size: usize,
}

impl InMemorySource {
    pub(crate) fn new(config: InMemorySourceConfig) -> Result<Self> {
        config.common_config.validate()?;
        let fields = Arc::new(config.fields);
        let tuples: Vec<Tuple> = config.rows.into_iter().map(Tuple::from_iter).collect();
        // width check up front, so a typo in a test fails at construction
        let rows = TupleBatch::new(fields.clone(), tuples)
            .context("💀 An in-memory row doesn't match the declared fields")?
            .tuples
            .into();
        Ok(Self {
            fields,
            rows,
            batch_size: config.common_config.max_batch_size_docs,
        })
    }
}

#[async_trait]
impl Source for InMemorySource {
    async fn next_batch(&mut self) -> Result<Option<TupleBatch>> {
        if self.rows.is_empty() {
            return Ok(None);
        }
        let take = self.batch_size.min(self.rows.len());
        let tuples: Vec<Tuple> = self.rows.drain(..take).collect();
        Ok(Some(TupleBatch::new(self.fields.clone(), tuples)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_rows_come_out_in_batches_then_stop() -> Result<()> {
        let mut config = InMemorySourceConfig::new(
            Fields::new(["id", "name"])?,
            [["1", "a"], ["2", "b"], ["3", "c"]],
        );
        config.common_config.max_batch_size_docs = 2;
        let mut source = InMemorySource::new(config)?;
        assert_eq!(source.next_batch().await?.map(|b| b.len()), Some(2));
        assert_eq!(source.next_batch().await?.map(|b| b.len()), Some(1));
        assert!(source.next_batch().await?.is_none());
        assert!(source.next_batch().await?.is_none());
        Ok(())
    }

    #[test]
    fn the_one_where_a_ragged_row_is_caught_early() -> Result<()> {
        let config = InMemorySourceConfig::new(Fields::new(["id", "name"])?, [vec!["1"]]);
        assert!(InMemorySource::new(config).is_err());
        Ok(())
    }
}
