//! # Previously, on estap...
//!
//! 🎬 The tuples were trapped in a file nobody wanted to create for a unit test.
//! Someone had to hold them. Someone had to write a backend so simple it lives
//! entirely in RAM, gone the moment you blink.
//!
//! `in_mem` provides an in-memory [`Source`](crate::backends::Source) that replays
//! rows from its config and an in-memory [`Sink`](crate::backends::Sink) that keeps every
//! composed payload behind an `Arc<Mutex<...>>` so callers can inspect what arrived.
//!
//! ⚠️ This is for tests and dry runs. If you're deploying this to prod, please also deploy a therapist.
//!
//! 🦆

mod in_mem_sink;
mod in_mem_source;

pub(crate) use in_mem_sink::InMemorySink;
pub use in_mem_sink::InMemorySinkConfig;
pub(crate) use in_mem_source::InMemorySource;
pub use in_mem_source::InMemorySourceConfig;
