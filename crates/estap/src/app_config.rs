//! 🔧 App config: one TOML file (plus `ESTAP_*` env vars) describing a whole flow.
//!
//! ```toml
//! [runtime]
//! queue_capacity = 10
//! sink_parallelism = 1
//!
//! [source_config.File]
//! file_name = "artists.dat"
//! fields = ["id", "name", "url", "picture", "ts"]
//!
//! [[pipes]]
//! Identity = ["garbage", "name", "url", "picture", "ts"]
//!
//! [sink_config.Elasticsearch]
//! url = "http://localhost:9200"
//! resource = "cascading-hadoop/alias"
//! fields = ["name", "url", "picture"]
//!
//! [properties]
//! "es.mapping.names" = "url:address"
//! ```
//!
//! Env vars merge first and the file wins. Nested keys use `__`:
//! `ESTAP_RUNTIME__SINK_PARALLELISM=4`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::backends::{
    ElasticsearchSinkConfig, FileSinkConfig, FileSourceConfig, InMemorySinkConfig, InMemorySourceConfig,
};
use crate::common::Fields;
use crate::pipes::PipeOp;
use crate::settings::Properties;

/// 🚰 Where tuples come from.
#[derive(Debug, Deserialize, Clone)]
pub enum SourceConfig {
    File(FileSourceConfig),
    InMemory(InMemorySourceConfig),
}

impl SourceConfig {
    /// 🏷️ The schema the source declares.
    pub fn fields(&self) -> &Fields {
        match self {
            SourceConfig::File(c) => &c.fields,
            SourceConfig::InMemory(c) => &c.fields,
        }
    }
}

impl From<FileSourceConfig> for SourceConfig {
    fn from(config: FileSourceConfig) -> Self {
        SourceConfig::File(config)
    }
}

impl From<InMemorySourceConfig> for SourceConfig {
    fn from(config: InMemorySourceConfig) -> Self {
        SourceConfig::InMemory(config)
    }
}

/// 🕳️ Where documents go.
#[derive(Debug, Deserialize, Clone)]
pub enum SinkConfig {
    Elasticsearch(ElasticsearchSinkConfig),
    File(FileSinkConfig),
    InMemory(InMemorySinkConfig),
}

impl SinkConfig {
    /// 🎯 The document projection, if the sink declares one.
    pub fn fields(&self) -> Option<&Fields> {
        match self {
            SinkConfig::Elasticsearch(c) => c.fields.as_ref(),
            SinkConfig::File(c) => c.fields.as_ref(),
            SinkConfig::InMemory(c) => c.fields.as_ref(),
        }
    }
}

impl From<ElasticsearchSinkConfig> for SinkConfig {
    fn from(config: ElasticsearchSinkConfig) -> Self {
        SinkConfig::Elasticsearch(config)
    }
}

impl From<FileSinkConfig> for SinkConfig {
    fn from(config: FileSinkConfig) -> Self {
        SinkConfig::File(config)
    }
}

impl From<InMemorySinkConfig> for SinkConfig {
    fn from(config: InMemorySinkConfig) -> Self {
        SinkConfig::InMemory(config)
    }
}

/// 🏃 Runtime knobs.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// 📬 Batches in flight between the source and the sinks.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// 🧵 Sink workers draining the channel, each with its own connection.
    #[serde(default = "default_sink_parallelism")]
    pub sink_parallelism: usize,
}

fn default_queue_capacity() -> usize {
    10
}

fn default_sink_parallelism() -> usize {
    1
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            sink_parallelism: default_sink_parallelism(),
        }
    }
}

/// 🗂️ A flow, start to finish.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub source_config: SourceConfig,
    /// 🚿 Name of the pipe joining source and sink.
    #[serde(default = "default_pipe_name")]
    pub pipe_name: String,
    #[serde(default)]
    pub pipes: Vec<PipeOp>,
    pub sink_config: SinkConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// ⚙️ `es.*` properties.
    #[serde(default, deserialize_with = "deserialize_properties")]
    pub properties: Properties,
}

fn default_pipe_name() -> String {
    "copy".to_string()
}

/// 📝 Property values are strings, but nobody should have to quote `100` in TOML.
fn deserialize_properties<'de, D>(deserializer: D) -> Result<Properties, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Integer(i64),
        Float(f64),
        Flag(bool),
    }

    let raw = BTreeMap::<String, Scalar>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Scalar::Text(s) => s,
                Scalar::Integer(n) => n.to_string(),
                Scalar::Float(f) => f.to_string(),
                Scalar::Flag(b) => b.to_string(),
            };
            (key, value)
        })
        .collect())
}

/// 📋 Load from `ESTAP_*` env vars, then the TOML file if given.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {}",
        config_file_name.map(|p| p.display().to_string()).unwrap_or_else(|| "(env only)".into())
    );

    let config = Figment::new().merge(Env::prefixed("ESTAP_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (ESTAP_*). \
             The file exists in our hearts, but apparently not in a shape we understand.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (ESTAP_*). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };
    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("💀 Failed to create a temp config. The filesystem said 'new phone who dis'.");
        file.write_all(contents.as_bytes())
            .expect("💀 Failed to write test config.");
        file
    }

    #[test]
    fn the_one_where_the_alias_flow_reads_from_toml() {
        let file = write_test_config(
            r#"
            pipe_name = "copy"

            [runtime]
            queue_capacity = 8
            sink_parallelism = 3

            [source_config.File]
            file_name = "artists.dat"
            fields = ["id", "name", "url", "picture", "ts"]

            [[pipes]]
            Identity = ["garbage", "name", "url", "picture", "ts"]

            [[pipes]]
            Rename = { from = "garbage", to = "junk" }

            [sink_config.Elasticsearch]
            url = "http://es:9200"
            resource = "cascading-hadoop/alias"
            fields = ["name", "url", "picture"]

            [properties]
            "es.mapping.names" = "url:address"
            "es.batch.size.entries" = 100
            "es.batch.write.refresh" = false
            "#,
        );

        let app_config = load_config(Some(file.path()))
            .expect("💀 The alias flow should parse. The schema drift goblin does not get this win.");

        assert_eq!(app_config.runtime.queue_capacity, 8);
        assert_eq!(app_config.runtime.sink_parallelism, 3);
        assert_eq!(app_config.pipes.len(), 2);
        assert_eq!(app_config.source_config.fields().len(), 5);
        assert_eq!(app_config.properties["es.mapping.names"], "url:address");
        assert_eq!(app_config.properties["es.batch.size.entries"], "100");
        assert_eq!(app_config.properties["es.batch.write.refresh"], "false");
        match app_config.sink_config {
            SinkConfig::Elasticsearch(es) => {
                assert_eq!(es.connection.url, "http://es:9200");
                assert_eq!(es.resource, "cascading-hadoop/alias");
                assert_eq!(es.fields.map(|f| f.len()), Some(3));
            }
            honestly_who_knows => panic!(
                "💀 Expected an Elasticsearch sink, but serde took us to {:?}. Plot twist energy.",
                honestly_who_knows
            ),
        }
    }

    #[test]
    fn the_one_where_defaults_show_up_uninvited_but_helpful() {
        let file = write_test_config(
            r#"
            [source_config.File]
            file_name = "input.tsv"
            fields = ["id"]

            [sink_config.File]
            file_name = "output.ndjson"
            "#,
        );
        let app_config: AppConfig = Figment::new()
            .merge(Toml::file(file.path()))
            .extract()
            .expect("💀 Defaults should fill the gaps.");

        assert_eq!(app_config.runtime, RuntimeConfig::default());
        assert_eq!(app_config.pipe_name, "copy");
        assert!(app_config.pipes.is_empty());
        assert!(app_config.properties.is_empty());
        match app_config.source_config {
            SourceConfig::File(file) => {
                assert_eq!(file.delimiter, '\t');
                assert!(file.strict);
                assert!(!file.has_header);
                assert_eq!(file.common_config.max_batch_size_docs, 1000);
            }
            other => panic!("💀 Expected a File source, got {:?}", other),
        }
    }

    #[test]
    fn the_one_where_runtime_knobs_come_from_the_runtime_table() {
        let file = write_test_config(
            r#"
            [runtime]
            queue_capacity = 12
            sink_parallelism = 4

            [source_config.InMemory]
            fields = ["id", "name"]
            rows = [["1", "a"]]

            [sink_config.InMemory]
            "#,
        );
        let app_config = load_config(Some(file.path()))
            .expect("💀 The runtime table should parse.");
        assert_eq!(app_config.runtime.queue_capacity, 12);
        assert_eq!(app_config.runtime.sink_parallelism, 4);
    }

    #[test]
    fn the_one_where_a_duplicate_field_fails_at_load_time() {
        let file = write_test_config(
            r#"
            [source_config.File]
            file_name = "input.tsv"
            fields = ["id", "id"]

            [sink_config.InMemory]
            "#,
        );
        assert!(load_config(Some(file.path())).is_err());
    }
}
