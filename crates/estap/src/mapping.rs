//! 🗺️ Mapping: what the cluster decided our fields are.
//!
//! 🎬 We sent strings. The cluster looked at `2012-10-06T19:20:25.000Z` and said
//! "that's a DATE", looked at `MALICE MIZER` and said "that's text". This module
//! reads that verdict back from `/_mapping` and renders it in one line:
//!
//! ```text
//! artists=[name=STRING, picture=STRING, url=STRING]
//! ```
//!
//! 🧠 Knowledge graph:
//! - Both response shapes parse: typeless `{idx:{mappings:{properties}}}` and typed
//!   `{idx:{mappings:{type:{properties}}}}`.
//! - `text`, `keyword` and the old `string` all read as `STRING`. Multi-field
//!   sub-mappings (`fields: {keyword: ...}`) are ignored.
//! - Fields are kept sorted by name, so the rendering is stable.
//! - `skip_headers` drops `_`-prefixed metadata fields.

use std::fmt;

use anyhow::{Context, Result, bail};
use serde_json::Value as Json;

use crate::resource::Resource;

/// 🏷️ A field's mapped type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Date,
    Long,
    Integer,
    Short,
    Byte,
    Double,
    Float,
    HalfFloat,
    ScaledFloat,
    Boolean,
    Binary,
    Ip,
    GeoPoint,
    GeoShape,
    Object,
    Nested,
    /// 🤷 Anything newer than this list, kept verbatim.
    Other(String),
}

impl FieldType {
    pub fn from_es_type(es_type: &str) -> Self {
        match es_type {
            "text" | "keyword" | "string" => Self::String,
            "date" | "date_nanos" => Self::Date,
            "long" => Self::Long,
            "integer" => Self::Integer,
            "short" => Self::Short,
            "byte" => Self::Byte,
            "double" => Self::Double,
            "float" => Self::Float,
            "half_float" => Self::HalfFloat,
            "scaled_float" => Self::ScaledFloat,
            "boolean" => Self::Boolean,
            "binary" => Self::Binary,
            "ip" => Self::Ip,
            "geo_point" => Self::GeoPoint,
            "geo_shape" => Self::GeoShape,
            "object" => Self::Object,
            "nested" => Self::Nested,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "STRING",
            Self::Date => "DATE",
            Self::Long => "LONG",
            Self::Integer => "INTEGER",
            Self::Short => "SHORT",
            Self::Byte => "BYTE",
            Self::Double => "DOUBLE",
            Self::Float => "FLOAT",
            Self::HalfFloat => "HALF_FLOAT",
            Self::ScaledFloat => "SCALED_FLOAT",
            Self::Boolean => "BOOLEAN",
            Self::Binary => "BINARY",
            Self::Ip => "IP",
            Self::GeoPoint => "GEO_POINT",
            Self::GeoShape => "GEO_SHAPE",
            Self::Object => "OBJECT",
            Self::Nested => "NESTED",
            Self::Other(other) => return f.write_str(&other.to_uppercase()),
        };
        f.write_str(name)
    }
}

/// 🌿 One mapped field. Objects carry their children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub properties: Vec<Field>,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.properties.is_empty() {
            write!(f, "{}={}", self.name, self.field_type)
        } else {
            write!(f, "{}=", self.name)?;
            write_fields(f, &self.properties)
        }
    }
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &[Field]) -> fmt::Result {
    f.write_str("[")?;
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", field)?;
    }
    f.write_str("]")
}

/// 🗺️ The mapping of one index (or one type of one index).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Mapping {
    /// 🔍 Parse a `GET /<index>/_mapping[/<type>]` response body for `resource`.
    pub fn parse(resource: &Resource, body: &Json) -> Result<Self> {
        let indices = body
            .as_object()
            .context("💀 The mapping response is not a JSON object")?;
        let index_entry = match indices.get(resource.index()) {
            Some(entry) => entry,
            // an alias answers under the concrete index name
            None if indices.len() == 1 => indices
                .values()
                .next()
                .context("💀 The mapping response has one entry and also none. Impressive.")?,
            None => bail!(
                "💀 The mapping response has no entry for index '{}' (found: {})",
                resource.index(),
                indices.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        };
        let mappings = index_entry
            .get("mappings")
            .with_context(|| format!("💀 Index '{}' answered without a 'mappings' section", resource.index()))?;

        let type_mapping = select_type_mapping(resource, mappings)?;
        let fields = match type_mapping.and_then(|m| m.get("properties")) {
            Some(properties) => parse_properties(properties)?,
            None => Vec::new(),
        };
        Ok(Self {
            name: resource.label().to_string(),
            fields,
        })
    }

    /// 🧹 The same mapping without `_`-prefixed metadata fields.
    pub fn skip_headers(&self) -> Self {
        Self {
            name: self.name.clone(),
            fields: self
                .fields
                .iter()
                .filter(|field| !field.name.starts_with('_'))
                .cloned()
                .collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=", self.name)?;
        write_fields(f, &self.fields)
    }
}

/// ⚙️ Keys that can sit next to (or instead of) `properties` without being a type.
const MAPPING_SETTINGS: &[&str] = &[
    "_all",
    "_field_names",
    "_meta",
    "_routing",
    "_size",
    "_source",
    "date_detection",
    "dynamic",
    "dynamic_date_formats",
    "dynamic_templates",
    "numeric_detection",
];

/// 🎯 Find the block that holds `properties`. `None` means "mapped, but nothing in it yet".
fn select_type_mapping<'a>(resource: &Resource, mappings: &'a Json) -> Result<Option<&'a Json>> {
    let object = match mappings.as_object() {
        Some(object) => object,
        None => bail!("💀 'mappings' for '{}' is not an object", resource),
    };
    if object.is_empty() {
        return Ok(None);
    }
    if object.contains_key("properties") {
        return Ok(Some(mappings));
    }
    if let Some(doc_type) = resource.doc_type() {
        return Ok(object.get(doc_type));
    }
    // typed cluster, untyped question: fine as long as there's only one type
    let types: Vec<&String> = object
        .keys()
        .filter(|key| !MAPPING_SETTINGS.contains(&key.as_str()))
        .collect();
    match types.as_slice() {
        [] => Ok(None),
        [only] => Ok(object.get(only.as_str())),
        many => bail!(
            "💀 Index '{}' has several types ({}); ask for one as 'index/type'",
            resource.index(),
            many.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        ),
    }
}

fn parse_properties(properties: &Json) -> Result<Vec<Field>> {
    let object = properties
        .as_object()
        .context("💀 'properties' in the mapping is not an object")?;
    let mut fields = Vec::with_capacity(object.len());
    for (name, definition) in object {
        let nested = definition.get("properties");
        let field_type = match definition.get("type").and_then(Json::as_str) {
            Some(es_type) => FieldType::from_es_type(es_type),
            None if nested.is_some() => FieldType::Object,
            None => bail!("💀 Mapped field '{}' has neither a type nor properties", name),
        };
        let properties = match nested {
            Some(children) => parse_properties(children)?,
            None => Vec::new(),
        };
        fields.push(Field {
            name: name.clone(),
            field_type,
            properties,
        });
    }
    fields.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text() -> Json {
        json!({"type": "text", "fields": {"keyword": {"type": "keyword", "ignore_above": 256}}})
    }

    #[test]
    fn the_one_where_a_typed_response_renders_like_the_old_days() -> Result<()> {
        let body = json!({
            "cascading-hadoop": {"mappings": {"artists": {"properties": {
                "url": text(), "name": text(), "picture": text()
            }}}}
        });
        let mapping = Mapping::parse(&Resource::parse("cascading-hadoop/artists")?, &body)?;
        assert_eq!(mapping.to_string(), "artists=[name=STRING, picture=STRING, url=STRING]");
        Ok(())
    }

    #[test]
    fn the_one_where_a_typeless_response_is_labelled_by_index() -> Result<()> {
        let body = json!({
            "pattern-format-2012-10-06": {"mappings": {"properties": {
                "ts": {"type": "date"}, "id": text(), "name": text()
            }}}
        });
        let mapping = Mapping::parse(&Resource::parse("pattern-format-2012-10-06")?, &body)?;
        assert_eq!(mapping.to_string(), "pattern-format-2012-10-06=[id=STRING, name=STRING, ts=DATE]");
        assert_eq!(mapping.field("ts").map(|f| &f.field_type), Some(&FieldType::Date));
        Ok(())
    }

    #[test]
    fn the_one_where_objects_nest_and_headers_get_skipped() -> Result<()> {
        let body = json!({
            "idx": {"mappings": {"_doc": {"properties": {
                "_meta_field": {"type": "keyword"},
                "artist": {"properties": {"plays": {"type": "long"}, "alias": {"type": "keyword"}}},
                "where": {"type": "geo_point"},
                "vector": {"type": "dense_vector"}
            }}}}
        });
        let mapping = Mapping::parse(&Resource::parse("idx")?, &body)?;
        assert_eq!(mapping.fields.len(), 4);
        assert_eq!(
            mapping.skip_headers().to_string(),
            "idx=[artist=[alias=STRING, plays=LONG], vector=DENSE_VECTOR, where=GEO_POINT]"
        );
        Ok(())
    }

    #[test]
    fn the_one_where_an_empty_index_has_an_empty_mapping() -> Result<()> {
        let body = json!({"idx": {"mappings": {}}});
        assert_eq!(Mapping::parse(&Resource::parse("idx")?, &body)?.to_string(), "idx=[]");
        let missing_type = json!({"idx": {"mappings": {"other": {"properties": {}}}}});
        assert_eq!(
            Mapping::parse(&Resource::parse("idx/artists")?, &missing_type)?.to_string(),
            "artists=[]"
        );
        Ok(())
    }

    #[test]
    fn the_one_where_garbage_responses_are_errors() -> Result<()> {
        let resource = Resource::parse("idx")?;
        assert!(Mapping::parse(&resource, &json!([])).is_err());
        assert!(Mapping::parse(&resource, &json!({"a": {}, "b": {}})).is_err());
        assert!(Mapping::parse(&resource, &json!({"idx": {"mappings": {"t1": {}, "t2": {}}}})).is_err());
        Ok(())
    }
}
