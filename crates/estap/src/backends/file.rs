//! 📁 File backends: delimited text in, NDJSON documents out.
//!
//! The source is the `DelimitedTap` of a flow: one record per line, TAB-separated by
//! default, declared field names, optional per-column types. The sink writes one
//! JSON document per line, handy for eyeballing what a cluster *would* have received.

mod file_sink;
mod file_source;

pub(crate) use file_sink::FileSink;
pub use file_sink::FileSinkConfig;
pub(crate) use file_source::FileSource;
pub use file_source::{FieldKind, FileSourceConfig};
