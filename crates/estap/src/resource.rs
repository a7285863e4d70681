//! 📍 Resources: where a document goes.
//!
//! A resource is `index` or `index/type`. A resource *pattern* is the same string
//! with holes in it: `cascading-hadoop/pattern-{id}` or
//! `logs-{ts:YYYY-MM-dd}`. Each tuple fills the holes from its own fields, so one
//! flow can fan out across many targets.
//!
//! 🧠 Knowledge graph:
//! - `ResourcePattern::parse` validates the template once (braces, names, formats).
//! - `ResourcePattern::resolve` fills it per tuple and parses the result into a `Resource`.
//! - Resolved index names are validated against Elasticsearch's naming rules here,
//!   so a bad value fails with the field name attached instead of a 400 from `/_bulk`.
//! - `{field:format}` and `{field|format}` are both accepted for date formatting.

pub mod date_format;

use std::fmt;

use anyhow::{Context, Result, bail};

use crate::common::TupleEntry;
use date_format::DateFormat;

/// 📍 A concrete write target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Resource {
    index: String,
    doc_type: Option<String>,
}

impl Resource {
    /// 🔧 Parse `index` or `index/type`, validating the index name.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (index, doc_type) = match raw.split_once('/') {
            Some((index, doc_type)) => {
                if doc_type.is_empty() || doc_type.contains('/') {
                    bail!(
                        "💀 Resource '{}' must look like 'index' or 'index/type'. One slash, maximum, and something after it.",
                        raw
                    );
                }
                (index, Some(doc_type.to_string()))
            }
            None => (raw, None),
        };
        validate_index_name(index).with_context(|| format!("💀 Invalid resource '{}'", raw))?;
        Ok(Self {
            index: index.to_string(),
            doc_type,
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn doc_type(&self) -> Option<&str> {
        self.doc_type.as_deref()
    }

    pub fn is_typed(&self) -> bool {
        self.doc_type.is_some()
    }

    /// 🏷️ The name the mapping is reported under: the type when typed, the index otherwise.
    pub fn label(&self) -> &str {
        self.doc_type.as_deref().unwrap_or(&self.index)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.doc_type {
            Some(doc_type) => write!(f, "{}/{}", self.index, doc_type),
            None => f.write_str(&self.index),
        }
    }
}

fn is_forbidden_in_index(c: char) -> bool {
    matches!(c, '\\' | '/' | '*' | '?' | '"' | '<' | '>' | '|' | ',' | '#' | ':') || c.is_whitespace()
}

/// 🚫 Elasticsearch index naming rules, enforced early.
pub fn validate_index_name(index: &str) -> Result<()> {
    if index.is_empty() {
        bail!("💀 Index name is empty");
    }
    if index == "." || index == ".." {
        bail!("💀 Index name cannot be '.' or '..'");
    }
    if index.starts_with(['-', '_', '+']) {
        bail!("💀 Index name '{}' cannot start with '-', '_' or '+'", index);
    }
    if let Some(bad) = index.chars().find(|&c| is_forbidden_in_index(c)) {
        bail!("💀 Index name '{}' contains the forbidden character {:?}", index, bad);
    }
    if index.chars().any(|c| c.is_uppercase()) {
        bail!("💀 Index name '{}' must be lowercase. Elasticsearch is very particular about this.", index);
    }
    if index.len() > 255 {
        let head: String = index.chars().take(32).collect();
        bail!("💀 Index name '{}...' is longer than 255 bytes", head);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field {
        name: String,
        format: Option<DateFormat>,
    },
}

/// 🧩 A resource template with `{field}` holes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePattern {
    template: String,
    segments: Vec<Segment>,
}

impl ResourcePattern {
    /// 🔧 Parse the template. Static templates are validated as resources right away.
    pub fn parse(template: &str) -> Result<Self> {
        let template = template.trim();
        if template.is_empty() {
            bail!("💀 Resource is empty. Documents need somewhere to live.");
        }
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;
        while let Some(open) = rest.find(['{', '}']) {
            if rest[open..].starts_with('}') {
                bail!("💀 Resource '{}' has a '}}' with no matching '{{'", template);
            }
            literal.push_str(&rest[..open]);
            let after_open = &rest[open + 1..];
            let close = after_open
                .find('}')
                .with_context(|| format!("💀 Resource '{}' has an unclosed '{{'", template))?;
            let inner = &after_open[..close];
            if inner.contains('{') {
                bail!("💀 Resource '{}' nests braces. One hole at a time, please.", template);
            }
            let (name, format) = match inner.split_once([':', '|']) {
                Some((name, format)) => (
                    name.trim(),
                    Some(DateFormat::parse(format.trim()).with_context(|| {
                        format!("💀 Bad date format in resource '{}'", template)
                    })?),
                ),
                None => (inner.trim(), None),
            };
            if name.is_empty() {
                bail!("💀 Resource '{}' has a '{{}}' with no field name inside", template);
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Field {
                name: name.to_string(),
                format,
            });
            rest = &after_open[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let pattern = Self {
            template: template.to_string(),
            segments,
        };
        if let Some(fixed) = pattern.as_static() {
            Resource::parse(&fixed)?;
        }
        Ok(pattern)
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn is_pattern(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Field { .. }))
    }

    /// 🏷️ True when the template writes to `index/type`. Field values can't add the
    /// slash: `resolve_string` refuses substituted text carrying one.
    pub fn is_typed(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Literal(text) if text.contains('/')))
    }

    /// 📌 The template itself when it has no holes.
    pub fn as_static(&self) -> Option<String> {
        if self.is_pattern() {
            None
        } else {
            Some(self.template.clone())
        }
    }

    /// 🏷️ Field names referenced by the template.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Field { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// 🎯 Fill the holes from one tuple and parse the concrete resource.
    pub fn resolve_string(&self, entry: &TupleEntry<'_>) -> Result<String> {
        let mut resolved = String::with_capacity(self.template.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => resolved.push_str(text),
                Segment::Field { name, format } => {
                    let value = entry.get(name).with_context(|| {
                        format!(
                            "💀 Resource '{}' needs field '{}' but the tuple only has {}",
                            self.template, name, entry.fields
                        )
                    })?;
                    let text = match format {
                        Some(format) => format.format_value(value).with_context(|| {
                            format!(
                                "💀 Field '{}' could not be formatted with '{}' for resource '{}'",
                                name,
                                format.source(),
                                self.template
                            )
                        })?,
                        None => value.as_text().with_context(|| {
                            format!(
                                "💀 Field '{}' is null, and a null can't name an index (resource '{}')",
                                name, self.template
                            )
                        })?,
                    };
                    if let Some(bad) = text.chars().find(|&c| is_forbidden_in_index(c)) {
                        bail!(
                            "💀 Field '{}' has the value '{}', whose {:?} can't appear in a resolved name (resource '{}')",
                            name,
                            text,
                            bad,
                            self.template
                        );
                    }
                    resolved.push_str(&text);
                }
            }
        }
        Ok(resolved)
    }

    pub fn resolve(&self, entry: &TupleEntry<'_>) -> Result<Resource> {
        let resolved = self.resolve_string(entry)?;
        Resource::parse(&resolved)
            .with_context(|| format!("💀 Resource pattern '{}' resolved to '{}'", self.template, resolved))
    }
}

impl fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}
