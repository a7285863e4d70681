//! 🚰 estap: tuples from delimited files into Elasticsearch, and the mappings to prove it.
//!
//! 🎬 *[a tab-separated file of artists. a cluster that has never heard of them.]*
//! *[one flow later, the cluster has opinions about every field.]*
//!
//! 🧠 Knowledge graph:
//! - `common`: `Fields`, `Value`, `Tuple`, `TupleBatch`, `TupleEntry`.
//! - `pipes`: named stages with `Identity`, `Rename`, `Retain`.
//! - `resource`: `index[/type]` targets and `{field}` / `{field:format}` patterns.
//! - `settings`: the `es.*` property layer.
//! - `transforms` → `composers` → `backends`: tuple to entry to payload to wire.
//! - `flow`: `FlowDef`, `FlowConnector`, `Flow::complete()`.
//! - `mapping`: what the cluster made of it all, rendered as `label=[field=TYPE, ...]`.
//! - `supervisors`: the workers and the channel between them.
//!
//! 🦆

use anyhow::Result;

pub mod app_config;
pub mod backends;
pub mod common;
pub(crate) mod composers;
pub mod flow;
pub mod mapping;
pub mod pipes;
pub mod progress;
pub mod resource;
pub mod settings;
pub(crate) mod supervisors;
pub(crate) mod transforms;

pub use app_config::{AppConfig, RuntimeConfig, SinkConfig, SourceConfig};
pub use backends::elasticsearch::{ClusterInfo, RestClient};
pub use backends::{ElasticsearchConnection, FieldKind, FileSinkConfig, InMemorySinkConfig, InMemorySourceConfig};
pub use common::{Fields, Tuple, TupleBatch, TupleEntry, Value};
pub use flow::{DelimitedTap, EsTap, Flow, FlowConnector, FlowDef};
pub use mapping::{Field, FieldType, Mapping};
pub use pipes::{Pipe, PipeOp};
pub use progress::FlowStats;
pub use resource::{Resource, ResourcePattern};
pub use settings::{EsSettings, Properties, WriteOperation};

/// 🚀 Run the flow an `AppConfig` describes.
pub async fn run(app_config: AppConfig) -> Result<FlowStats> {
    let AppConfig {
        source_config,
        pipe_name,
        pipes,
        sink_config,
        runtime,
        properties,
    } = app_config;
    let pipe = pipes.into_iter().fold(Pipe::new(pipe_name), Pipe::each);
    FlowConnector::new(properties)
        .with_runtime(runtime)
        .connect_parts(source_config, sink_config, &pipe)?
        .complete()
        .await
}

/// 🗺️ Fetch the mapping of `resource` (`index` or `index/type`) from the cluster.
pub async fn fetch_mapping(connection: ElasticsearchConnection, resource: &str) -> Result<Mapping> {
    RestClient::new(connection)?.get_mapping(resource).await
}
