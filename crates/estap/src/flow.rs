//! 🌊 Flows: a source tap, a pipe, a sink tap, and the button that runs them.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use estap::{DelimitedTap, EsTap, Fields, FlowConnector, FlowDef, Pipe, Properties};
//!
//! let input = DelimitedTap::new("artists.dat", Fields::new(["id", "name", "url", "picture", "ts"])?);
//! let output = EsTap::new("cascading-hadoop/artists", Some(Fields::new(["name", "url", "picture"])?));
//! let pipe = Pipe::new("copy");
//!
//! let flow_def = FlowDef::new().add_source(&pipe, input).add_tail_sink(&pipe, output);
//! let stats = FlowConnector::new(Properties::new()).connect(flow_def)?.complete().await?;
//! println!("{}", stats);
//! # Ok(())
//! # }
//! ```
//!
//! 🧠 Knowledge graph:
//! - `FlowDef` collects taps by pipe name. Exactly one source and one tail sink,
//!   joined by the same pipe name. No graphs, no joins, no groupings.
//! - `FlowConnector::connect` is where everything that can be checked without I/O
//!   gets checked: settings, pipe widths, projections, pattern fields, `es.mapping.id`.
//! - `Flow::complete` does the I/O and hands back `FlowStats`.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::app_config::{RuntimeConfig, SinkConfig, SourceConfig};
use crate::backends::{ElasticsearchSinkConfig, FileSourceConfig};
use crate::pipes::Pipe;
use crate::progress::{FlowCounters, FlowStats};
use crate::resource::ResourcePattern;
use crate::settings::{EsSettings, Properties};
use crate::supervisors::Supervisor;
use crate::transforms::document::DocumentPlan;

/// 🎯 The Elasticsearch sink tap.
pub type EsTap = ElasticsearchSinkConfig;

/// 📄 The delimited text source tap.
pub type DelimitedTap = FileSourceConfig;

/// 📋 The unconnected description of a flow.
#[derive(Debug, Clone, Default)]
pub struct FlowDef {
    name: Option<String>,
    sources: Vec<(String, SourceConfig)>,
    tail_sinks: Vec<(Pipe, SinkConfig)>,
}

impl FlowDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 🚰 Bind a source tap to the head of `pipe`.
    pub fn add_source(mut self, pipe: &Pipe, source: impl Into<SourceConfig>) -> Self {
        self.sources.push((pipe.name().to_string(), source.into()));
        self
    }

    /// 🕳️ Bind a sink tap to the tail of `pipe`. The pipe's operations come along.
    pub fn add_tail_sink(mut self, pipe: &Pipe, sink: impl Into<SinkConfig>) -> Self {
        self.tail_sinks.push((pipe.clone(), sink.into()));
        self
    }
}

/// 🔌 Turns a `FlowDef` into a runnable `Flow`, under a set of properties.
#[derive(Debug, Clone, Default)]
pub struct FlowConnector {
    properties: Properties,
    runtime: RuntimeConfig,
}

impl FlowConnector {
    pub fn new(properties: Properties) -> Self {
        Self {
            properties,
            runtime: RuntimeConfig::default(),
        }
    }

    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    /// 🔗 Validate and connect.
    pub fn connect(&self, flow_def: FlowDef) -> Result<Flow> {
        let FlowDef {
            name,
            mut sources,
            mut tail_sinks,
        } = flow_def;

        let (source_pipe, source) = match sources.len() {
            0 => bail!("💀 The flow has no source. Call add_source before connecting."),
            1 => sources.remove(0),
            n => bail!("💀 The flow has {} sources; one source per flow is all we run", n),
        };
        let (pipe, sink) = match tail_sinks.len() {
            0 => bail!("💀 The flow has no tail sink. Call add_tail_sink before connecting."),
            1 => tail_sinks.remove(0),
            n => bail!("💀 The flow has {} tail sinks; one sink per flow is all we run", n),
        };
        if source_pipe != pipe.name() {
            bail!(
                "💀 The source is bound to pipe '{}' but the sink hangs off pipe '{}'. They have to be the same pipe.",
                source_pipe,
                pipe.name()
            );
        }

        let name = name.unwrap_or_else(|| pipe.name().to_string());
        self.build(name, source, sink, &pipe)
    }

    /// 🔗 The three-argument form: source, sink, and the pipe between them.
    pub fn connect_parts(
        &self,
        source: impl Into<SourceConfig>,
        sink: impl Into<SinkConfig>,
        pipe: &Pipe,
    ) -> Result<Flow> {
        self.build(pipe.name().to_string(), source.into(), sink.into(), pipe)
    }

    fn build(&self, name: String, source: SourceConfig, sink: SinkConfig, pipe: &Pipe) -> Result<Flow> {
        if self.runtime.queue_capacity == 0 {
            bail!("💀 runtime.queue_capacity must be at least 1");
        }
        if self.runtime.sink_parallelism == 0 {
            bail!("💀 runtime.sink_parallelism must be at least 1. Zero sinks is just a very slow /dev/null.");
        }

        let settings = Arc::new(
            EsSettings::from_properties(&self.properties)
                .with_context(|| format!("💀 Flow '{}' has invalid properties", name))?,
        );
        let plan = pipe
            .plan(source.fields())
            .with_context(|| format!("💀 Flow '{}': the pipe doesn't fit the source", name))?;
        let fields = plan.output();

        DocumentPlan::compile(fields, sink.fields(), &settings)
            .with_context(|| format!("💀 Flow '{}': the sink can't build documents from {}", name, fields))?;

        if let SinkConfig::Elasticsearch(es) = &sink {
            let pattern = ResourcePattern::parse(&es.resource)?;
            for field in pattern.field_names() {
                if fields.position(field).is_none() {
                    bail!(
                        "💀 Flow '{}': resource '{}' uses field '{}' but the tuples reaching the sink only have {}",
                        name,
                        es.resource,
                        field,
                        fields
                    );
                }
            }
        }

        info!("🔗 Connected flow '{}': {} → {}", name, source.fields(), fields);
        let counters = Arc::new(FlowCounters::default());
        Ok(Flow {
            name,
            supervisor: Supervisor::new(source, sink, plan, settings, self.runtime.clone(), counters.clone()),
            counters,
        })
    }
}

/// 🌊 A connected flow, ready to run exactly once.
#[derive(Debug)]
pub struct Flow {
    name: String,
    supervisor: Supervisor,
    counters: Arc<FlowCounters>,
}

impl Flow {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// ▶️ Run to completion.
    pub async fn complete(self) -> Result<FlowStats> {
        let started = Instant::now();
        info!("▶️ Flow '{}' starting", self.name);
        self.supervisor
            .start_workers()
            .await
            .with_context(|| format!("💀 Flow '{}' failed", self.name))?;
        let stats = self.counters.snapshot(started.elapsed());
        info!(
            "✅ Flow '{}' complete: {} tuples read, {} documents written",
            self.name, stats.tuples_read, stats.documents_written
        );
        Ok(stats)
    }
}
