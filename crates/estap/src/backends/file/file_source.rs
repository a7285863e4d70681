//! 🧾 Delimited text source.
//!
//! 🎬 *[a file full of tabs. five columns. one of them called `ts` that is definitely a date.]*
//!
//! Lines are read with tokio, each line is split by the `csv` crate (so quoting
//! works when asked for), widths are checked against the declared `Fields`, and
//! typed columns are coerced. A record can't span lines: a quoted field holding a
//! newline is read as two broken records.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{self, AsyncBufReadExt};
use tracing::{debug, trace, warn};

use crate::backends::{CommonSourceConfig, Source};
use crate::common::{Fields, Tuple, TupleBatch, Value};
use crate::progress::ProgressMetrics;

/// 🏷️ What a column's text should become.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    String,
    Long,
    Double,
    Bool,
}

impl FieldKind {
    /// 🔄 Coerce one cell. Empty cells in typed columns are `Null`; strings stay as read.
    fn coerce(self, cell: &str) -> std::result::Result<Value, String> {
        if self == FieldKind::String {
            return Ok(Value::String(cell.to_string()));
        }
        let cell = cell.trim();
        if cell.is_empty() {
            return Ok(Value::Null);
        }
        match self {
            FieldKind::String => Ok(Value::String(cell.to_string())),
            FieldKind::Long => cell.parse::<i64>().map(Value::Long).map_err(|e| e.to_string()),
            FieldKind::Double => cell.parse::<f64>().map(Value::Double).map_err(|e| e.to_string()),
            FieldKind::Bool => match cell.to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "f" | "no" | "0" => Ok(Value::Bool(false)),
                other => Err(format!("'{}' is not a boolean", other)),
            },
        }
    }
}

/// 🧾 Where the text lives and how to read it.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FileSourceConfig {
    pub file_name: String,
    /// 🏷️ Declared schema, one name per column.
    pub fields: Fields,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// 📎 Quote character. Unset means quotes are ordinary characters.
    #[serde(default)]
    pub quote: Option<char>,
    /// ⏭️ Skip the first non-blank line.
    #[serde(default)]
    pub has_header: bool,
    /// 📏 Fail on records whose width doesn't match `fields`. Off: pad with nulls or truncate.
    #[serde(default = "default_strict")]
    pub strict: bool,
    /// 🏷️ Per-field coercion. Unlisted fields stay strings.
    #[serde(default)]
    pub types: BTreeMap<String, FieldKind>,
    #[serde(flatten, default)]
    pub common_config: CommonSourceConfig,
}

fn default_delimiter() -> char {
    '\t'
}

fn default_strict() -> bool {
    true
}

impl FileSourceConfig {
    /// 🏗️ TAB-separated, no header, strict, every column a string.
    pub fn new(file_name: impl Into<String>, fields: Fields) -> Self {
        Self {
            file_name: file_name.into(),
            fields,
            delimiter: default_delimiter(),
            quote: None,
            has_header: false,
            strict: default_strict(),
            types: BTreeMap::new(),
            common_config: CommonSourceConfig::default(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote(mut self, quote: char) -> Self {
        self.quote = Some(quote);
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_type(mut self, field: impl Into<String>, kind: FieldKind) -> Self {
        self.types.insert(field.into(), kind);
        self
    }
}

/// 🔤 Separators go to `csv` as single bytes.
fn ascii_byte(c: char, what: &str) -> Result<u8> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        bail!("💀 The {} '{}' must be a single ASCII character", what, c)
    }
}

pub(crate) struct FileSource {
    buf_reader: io::BufReader<File>,
    source_config: FileSourceConfig,
    fields: Arc<Fields>,
    kinds: Vec<FieldKind>,
    parser: csv::ReaderBuilder,
    line_number: u64,
    header_pending: bool,
    exhausted: bool,
    progress: ProgressMetrics,
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("source_config", &self.source_config)
            .field("line_number", &self.line_number)
            .finish() // progress omitted, it's a terminal widget, not data
    }
}

impl FileSource {
    pub(crate) async fn new(source_config: FileSourceConfig) -> Result<Self> {
        source_config.common_config.validate()?;

        let mut kinds = vec![FieldKind::String; source_config.fields.len()];
        for (field, kind) in &source_config.types {
            let position = source_config.fields.position(field).with_context(|| {
                format!(
                    "💀 A type was declared for '{}', but the source's fields are {}",
                    field, source_config.fields
                )
            })?;
            kinds[position] = *kind;
        }

        let mut parser = csv::ReaderBuilder::new();
        parser
            .has_headers(false)
            .flexible(true)
            .delimiter(ascii_byte(source_config.delimiter, "delimiter")?);
        match source_config.quote {
            Some(quote) => {
                parser.quoting(true).quote(ascii_byte(quote, "quote")?);
            }
            None => {
                parser.quoting(false);
            }
        }

        let file_handle = File::open(&source_config.file_name).await.with_context(|| {
            format!(
                "💀 The door to '{}' would not budge. We knocked. We checked if it existed \
                (it might not). We checked permissions (they might be wrong). The file remains unopened.",
                source_config.file_name
            )
        })?;
        let file_size = file_handle.metadata().await.map(|m| m.len()).unwrap_or(0);
        let progress = ProgressMetrics::new(source_config.file_name.clone(), file_size);
        debug!(
            "🧾 Opened '{}' ({} bytes), fields {}",
            source_config.file_name, file_size, source_config.fields
        );

        Ok(Self {
            buf_reader: io::BufReader::new(file_handle),
            fields: Arc::new(source_config.fields.clone()),
            header_pending: source_config.has_header,
            source_config,
            kinds,
            parser,
            line_number: 0,
            exhausted: false,
            progress,
        })
    }

    /// ✂️ One line → one tuple, or an error naming the file and line.
    fn parse_line(&self, line: &str) -> Result<Tuple> {
        let mut reader = self.parser.from_reader(line.as_bytes());
        let mut record = csv::StringRecord::new();
        reader.read_record(&mut record).with_context(|| {
            format!(
                "💀 {}:{} could not be split into fields",
                self.source_config.file_name, self.line_number
            )
        })?;

        let declared = self.fields.len();
        if record.len() != declared {
            if self.source_config.strict {
                bail!(
                    "💀 {}:{} has {} fields but the schema {} declares {}. \
                    Set strict = false to pad or truncate instead.",
                    self.source_config.file_name,
                    self.line_number,
                    record.len(),
                    self.fields,
                    declared
                );
            }
            warn!(
                "⚠️ {}:{} has {} fields, expected {}; {}",
                self.source_config.file_name,
                self.line_number,
                record.len(),
                declared,
                if record.len() < declared {
                    "padding with nulls"
                } else {
                    "dropping the extras"
                }
            );
        }

        let mut values = Vec::with_capacity(declared);
        for (position, kind) in self.kinds.iter().enumerate() {
            let value = match record.get(position) {
                Some(cell) => kind.coerce(cell).map_err(|reason| {
                    anyhow::anyhow!(
                        "💀 {}:{} field '{}' = '{}' is not a valid {:?}: {}",
                        self.source_config.file_name,
                        self.line_number,
                        self.fields.names()[position],
                        cell,
                        kind,
                        reason
                    )
                })?,
                None => Value::Null,
            };
            values.push(value);
        }
        Ok(Tuple::new(values))
    }
}

#[async_trait]
impl Source for FileSource {
    async fn next_batch(&mut self) -> Result<Option<TupleBatch>> {
        if self.exhausted {
            return Ok(None);
        }
        let limits = self.source_config.common_config.clone();
        let mut tuples = Vec::with_capacity(limits.max_batch_size_docs.min(4096));
        let mut batch_bytes = 0usize;
        let mut line = String::new();

        while tuples.len() < limits.max_batch_size_docs && batch_bytes < limits.max_batch_size_bytes {
            line.clear();
            let bytes_read = self.buf_reader.read_line(&mut line).await.with_context(|| {
                format!(
                    "💀 Reading '{}' failed after line {}",
                    self.source_config.file_name, self.line_number
                )
            })?;
            if bytes_read == 0 {
                self.exhausted = true;
                break;
            }
            self.line_number += 1;
            batch_bytes += bytes_read;

            let trimmed = line.trim_end_matches('\n').trim_end_matches('\r');
            if trimmed.trim().is_empty() {
                continue;
            }
            if self.header_pending {
                self.header_pending = false;
                debug!("⏭️ Skipping header line: {}", trimmed);
                continue;
            }
            tuples.push(self.parse_line(trimmed)?);
        }

        trace!(
            "📖 hauled {} bytes / {} tuples out of '{}'",
            batch_bytes,
            tuples.len(),
            self.source_config.file_name
        );
        self.progress.update(batch_bytes as u64, tuples.len() as u64);
        if self.exhausted {
            self.progress.finish();
        }

        if tuples.is_empty() && self.exhausted {
            return Ok(None);
        }
        Ok(Some(TupleBatch::new(self.fields.clone(), tuples)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write fixture");
        file
    }

    fn fields() -> Fields {
        Fields::new(["id", "name", "url", "picture", "ts"]).expect("fields")
    }

    async fn drain(source: &mut FileSource) -> Result<Vec<TupleBatch>> {
        let mut batches = Vec::new();
        while let Some(batch) = source.next_batch().await? {
            batches.push(batch);
        }
        Ok(batches)
    }

    #[tokio::test]
    async fn the_one_where_tabs_become_tuples() -> Result<()> {
        let file = fixture(
            "1\tMALICE MIZER\thttp://www.last.fm/music/MALICE+MIZER\thttp://userserve-ak.last.fm/serve/252/10808.jpg\t2012-10-06T19:20:25.000Z\n\
             \n\
             2\tDiary of Dreams\thttp://www.last.fm/music/Diary+of+Dreams\thttp://userserve-ak.last.fm/serve/252/3052066.jpg\t2012-10-06T19:20:25.000Z\n",
        );
        let path = file.path().display().to_string();
        let mut source = FileSource::new(FileSourceConfig::new(path, fields())).await?;
        let batches = drain(&mut source).await?;
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.len(), 2);
        let second = batch.entries().nth(1).expect("second tuple");
        assert_eq!(second.get("name"), Some(&Value::from("Diary of Dreams")));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_batches_respect_the_doc_limit() -> Result<()> {
        let rows: String = (1..=5).map(|i| format!("{i}\tn{i}\tu{i}\tp{i}\tt{i}\n")).collect();
        let file = fixture(&rows);
        let mut config = FileSourceConfig::new(file.path().display().to_string(), fields());
        config.common_config.max_batch_size_docs = 2;
        let mut source = FileSource::new(config).await?;
        let sizes: Vec<usize> = drain(&mut source).await?.iter().map(TupleBatch::len).collect();
        assert_eq!(sizes, [2, 2, 1]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_strict_mode_names_the_line() -> Result<()> {
        let file = fixture("1\ta\tb\tc\td\n2\tshort\n");
        let mut source = FileSource::new(FileSourceConfig::new(file.path().display().to_string(), fields())).await?;
        let err = drain(&mut source).await.expect_err("short record must fail");
        let message = format!("{:#}", err);
        assert!(message.contains(":2 has 2 fields"), "got: {message}");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_lenient_mode_pads_and_truncates() -> Result<()> {
        let file = fixture("1\tonly\n2\ta\tb\tc\td\textra\n");
        let config = FileSourceConfig::new(file.path().display().to_string(), fields()).strict(false);
        let mut source = FileSource::new(config).await?;
        let batch = source.next_batch().await?.expect("one batch");
        let first = batch.entries().next().expect("first");
        assert_eq!(first.get("url"), Some(&Value::Null));
        let second = batch.entries().nth(1).expect("second");
        assert_eq!(second.tuple.len(), 5);
        assert_eq!(second.get("ts"), Some(&Value::from("d")));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_csv_with_a_header_and_types_behaves() -> Result<()> {
        let file = fixture("id,name,score,active\n7,\"Moi, dix Mois\",4.5,yes\n8,Gackt,,no\n");
        let config = FileSourceConfig::new(
            file.path().display().to_string(),
            Fields::new(["id", "name", "score", "active"])?,
        )
        .with_delimiter(',')
        .with_quote('"')
        .with_header(true)
        .with_type("id", FieldKind::Long)
        .with_type("score", FieldKind::Double)
        .with_type("active", FieldKind::Bool);
        let mut source = FileSource::new(config).await?;
        let batch = source.next_batch().await?.expect("batch");
        let rows: Vec<_> = batch.entries().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&Value::Long(7)));
        assert_eq!(rows[0].get("name"), Some(&Value::from("Moi, dix Mois")));
        assert_eq!(rows[0].get("active"), Some(&Value::Bool(true)));
        assert_eq!(rows[1].get("score"), Some(&Value::Null));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_bad_number_is_reported_with_its_field() -> Result<()> {
        let file = fixture("x1\tn\tu\tp\tt\n");
        let config = FileSourceConfig::new(file.path().display().to_string(), fields())
            .with_type("id", FieldKind::Long);
        let mut source = FileSource::new(config).await?;
        let err = source.next_batch().await.expect_err("x1 is not a long");
        assert!(err.to_string().contains("field 'id' = 'x1'"), "got: {err}");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_misconfiguration_fails_before_reading() {
        assert!(FileSource::new(FileSourceConfig::new("/definitely/not/here.dat", fields())).await.is_err());
        let typo = FileSourceConfig::new("/definitely/not/here.dat", fields()).with_type("idd", FieldKind::Long);
        let err = FileSource::new(typo).await.expect_err("unknown typed field");
        assert!(err.to_string().contains("'idd'"));
    }
}
