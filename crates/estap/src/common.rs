//! 📦 Common data structures: the tuple model that every stage of a flow speaks.
//!
//! 🎬 A line of tab-separated text walks into a pipeline. It leaves as a
//! `Tuple`, wearing a name tag from its `Fields`. Nobody at the party knows
//! it used to be a line. It prefers it that way.
//!
//! 🧠 Knowledge graph:
//! - `Fields`: ordered, unique names. The schema. Shared via `Arc` because every
//!   tuple in a batch has the same one and cloning strings per row is a hobby, not a plan.
//! - `Value`: one cell. Strings stay strings so the cluster's dynamic mapping decides
//!   what `2012-10-06T19:20:25.000Z` is (spoiler: a DATE).
//! - `TupleBatch`: the unit that crosses the channel between source and sink workers.
//! - `TupleEntry`: a borrowed view of one row, lookup by field name.
//!
//! 🦆

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// 🏷️ An ordered, duplicate-free list of field names.
///
/// The declared schema of a tap, the projection of a sink, the rename list of an
/// `Identity` pipe. Construction validates, so a `Fields` in hand is a `Fields` you can trust.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fields {
    names: Vec<String>,
}

impl Fields {
    /// 🏗️ Build a `Fields`, rejecting empty names and duplicates.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            bail!("💀 A Fields declaration needs at least one field name. Zero columns is a mood, not a schema.");
        }
        for (position, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                bail!("💀 Field at position {} has an empty name. Every column deserves a name.", position);
            }
            if names[..position].contains(name) {
                bail!("💀 Field '{}' is declared twice in {:?}. Pick one. They can't both be the favourite.", name, names);
            }
        }
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// 🔍 Position of `name`, if declared.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| candidate == name)
    }

    /// 🎯 Positions of every field in `selector`, in selector order.
    ///
    /// Errors name the missing field and what was actually available, because
    /// "field not found" with no context is how 3am incidents start.
    pub fn select(&self, selector: &Fields) -> Result<Vec<usize>> {
        selector
            .names
            .iter()
            .map(|wanted| {
                self.position(wanted).with_context(|| {
                    format!(
                        "💀 Field '{}' was requested but the tuple only carries {}",
                        wanted, self
                    )
                })
            })
            .collect()
    }
}

impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names.join(", "))
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let names = Vec::<String>::deserialize(deserializer)?;
        Fields::new(names).map_err(serde::de::Error::custom)
    }
}

/// 🧪 One cell of a tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Long(i64),
    Double(f64),
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// 📝 Render for use inside index names and `_id`s. `Null` has no text form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Long(n) => Some(n.to_string()),
            Value::Double(d) => Some(d.to_string()),
            Value::Bool(b) => Some(b.to_string()),
        }
    }

    /// 🔄 Into JSON for the document body. Non-finite doubles become `null`,
    /// since JSON has no NaN and Elasticsearch has no sense of humour about it.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Long(n) => serde_json::Value::from(*n),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bool(b) => serde_json::Value::Bool(*b),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

/// 📦 A row. Positional; the names live in the batch's `Fields`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Value> {
        self.values.get(position)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// ✂️ Keep only the given positions, in the given order.
    pub fn project(&self, positions: &[usize]) -> Tuple {
        Tuple {
            values: positions
                .iter()
                .map(|&p| self.values.get(p).cloned().unwrap_or(Value::Null))
                .collect(),
        }
    }
}

impl<V: Into<Value>> FromIterator<V> for Tuple {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        Tuple {
            values: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// 👀 One tuple plus the names to read it by.
#[derive(Debug, Clone, Copy)]
pub struct TupleEntry<'a> {
    pub fields: &'a Fields,
    pub tuple: &'a Tuple,
}

impl<'a> TupleEntry<'a> {
    pub fn new(fields: &'a Fields, tuple: &'a Tuple) -> Self {
        Self { fields, tuple }
    }

    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.fields.position(name).and_then(|p| self.tuple.get(p))
    }
}

/// 🚚 Tuples that share a schema, travelling together.
#[derive(Debug, Clone)]
pub struct TupleBatch {
    pub fields: Arc<Fields>,
    pub tuples: Vec<Tuple>,
}

impl TupleBatch {
    /// 🏗️ Assemble a batch, checking every tuple is as wide as the schema.
    pub fn new(fields: Arc<Fields>, tuples: Vec<Tuple>) -> Result<Self> {
        if let Some((row, bad)) = tuples
            .iter()
            .enumerate()
            .find(|(_, tuple)| tuple.len() != fields.len())
        {
            bail!(
                "💀 Tuple #{} has {} values but the schema {} declares {}",
                row,
                bad.len(),
                fields,
                fields.len()
            );
        }
        Ok(Self { fields, tuples })
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = TupleEntry<'_>> {
        self.tuples
            .iter()
            .map(|tuple| TupleEntry::new(&self.fields, tuple))
    }
}
