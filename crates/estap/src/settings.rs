//! ⚙️ Settings: the `es.*` property layer.
//!
//! Flows are configured with a flat string map (the same shape as the properties
//! handed to a flow connector), e.g. `es.mapping.names = "url:address"`. This module
//! turns that map into a typed `EsSettings`, failing fast on anything malformed.
//!
//! | Property | Default | Meaning |
//! |---|---|---|
//! | `es.mapping.names` | none | `orig:renamed` pairs, comma separated |
//! | `es.mapping.id` | none | field whose value becomes `_id` |
//! | `es.mapping.exclude` | none | fields dropped from the document body |
//! | `es.write.operation` | `index` | `index`, `create`, `update`, `upsert` |
//! | `es.batch.size.entries` | `1000` | documents per bulk request |
//! | `es.batch.size.bytes` | `1mb` | bytes per bulk request |
//! | `es.batch.write.retry.count` | `3` | rounds of retry for rejected (429) documents |
//! | `es.batch.write.retry.wait` | `10s` | pause between retry rounds |
//! | `es.batch.write.refresh` | `true` | refresh touched indices on close |
//! | `es.index.auto.create` | `yes` | `no` = every target index must already exist |
//! | `es.nodes` | sink config `url` | cluster URL, overrides the sink's connection |
//! | `es.net.http.auth.user` / `.pass` | none | basic auth, overrides the sink's connection |

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::warn;

pub const ES_MAPPING_NAMES: &str = "es.mapping.names";
pub const ES_MAPPING_ID: &str = "es.mapping.id";
pub const ES_MAPPING_EXCLUDE: &str = "es.mapping.exclude";
pub const ES_WRITE_OPERATION: &str = "es.write.operation";
pub const ES_BATCH_SIZE_ENTRIES: &str = "es.batch.size.entries";
pub const ES_BATCH_SIZE_BYTES: &str = "es.batch.size.bytes";
pub const ES_BATCH_WRITE_RETRY_COUNT: &str = "es.batch.write.retry.count";
pub const ES_BATCH_WRITE_RETRY_WAIT: &str = "es.batch.write.retry.wait";
pub const ES_BATCH_WRITE_REFRESH: &str = "es.batch.write.refresh";
pub const ES_INDEX_AUTO_CREATE: &str = "es.index.auto.create";
pub const ES_NODES: &str = "es.nodes";
pub const ES_NET_HTTP_AUTH_USER: &str = "es.net.http.auth.user";
pub const ES_NET_HTTP_AUTH_PASS: &str = "es.net.http.auth.pass";

const KNOWN_KEYS: &[&str] = &[
    ES_MAPPING_NAMES,
    ES_MAPPING_ID,
    ES_MAPPING_EXCLUDE,
    ES_WRITE_OPERATION,
    ES_BATCH_SIZE_ENTRIES,
    ES_BATCH_SIZE_BYTES,
    ES_BATCH_WRITE_RETRY_COUNT,
    ES_BATCH_WRITE_RETRY_WAIT,
    ES_BATCH_WRITE_REFRESH,
    ES_INDEX_AUTO_CREATE,
    ES_NODES,
    ES_NET_HTTP_AUTH_USER,
    ES_NET_HTTP_AUTH_PASS,
];

/// 🗂️ Flow properties. Ordered so logs and errors come out the same way twice.
pub type Properties = BTreeMap<String, String>;

/// ✍️ What a bulk entry asks the cluster to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteOperation {
    #[default]
    Index,
    Create,
    Update,
    Upsert,
}

impl WriteOperation {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "index" => Ok(Self::Index),
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "upsert" => Ok(Self::Upsert),
            other => bail!(
                "💀 {} = '{}' is not a write operation. Try index, create, update or upsert.",
                ES_WRITE_OPERATION,
                other
            ),
        }
    }

    /// 🆔 Update-flavoured operations can't work without a document id.
    pub fn requires_id(&self) -> bool {
        matches!(self, Self::Update | Self::Upsert)
    }

    /// 🏷️ The bulk action keyword.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Create => "create",
            Self::Update | Self::Upsert => "update",
        }
    }
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Index => "index",
            Self::Create => "create",
            Self::Update => "update",
            Self::Upsert => "upsert",
        };
        f.write_str(name)
    }
}

/// ⚙️ Typed view of the `es.*` properties.
#[derive(Debug, Clone, PartialEq)]
pub struct EsSettings {
    /// 🏷️ `(original, renamed)` pairs, in declaration order.
    pub mapping_names: Vec<(String, String)>,
    pub mapping_id: Option<String>,
    pub mapping_exclude: Vec<String>,
    pub write_operation: WriteOperation,
    pub batch_size_entries: usize,
    pub batch_size_bytes: usize,
    pub retry_count: u32,
    pub retry_wait: Duration,
    pub refresh_after_write: bool,
    pub index_auto_create: bool,
    /// 📡 `es.nodes`: first node wins; schemeless hosts get `http://`.
    pub nodes: Option<String>,
    pub auth_user: Option<String>,
    pub auth_pass: Option<String>,
}

impl Default for EsSettings {
    fn default() -> Self {
        Self {
            mapping_names: Vec::new(),
            mapping_id: None,
            mapping_exclude: Vec::new(),
            write_operation: WriteOperation::Index,
            batch_size_entries: 1000,
            batch_size_bytes: 1024 * 1024,
            retry_count: 3,
            retry_wait: Duration::from_secs(10),
            refresh_after_write: true,
            index_auto_create: true,
            nodes: None,
            auth_user: None,
            auth_pass: None,
        }
    }
}

impl EsSettings {
    /// 🔧 Defaults overlaid with whatever `es.*` keys the properties carry.
    pub fn from_properties(properties: &Properties) -> Result<Self> {
        let mut settings = Self::default();
        for (key, value) in properties {
            if !key.starts_with("es.") {
                continue;
            }
            let value = value.trim();
            match key.as_str() {
                ES_MAPPING_NAMES => settings.mapping_names = parse_mapping_names(value)?,
                ES_MAPPING_ID => settings.mapping_id = non_empty(value),
                ES_MAPPING_EXCLUDE => settings.mapping_exclude = parse_list(value),
                ES_WRITE_OPERATION => settings.write_operation = WriteOperation::parse(value)?,
                ES_BATCH_SIZE_ENTRIES => {
                    settings.batch_size_entries = value
                        .parse()
                        .with_context(|| format!("💀 {} = '{}' is not a count", key, value))?;
                }
                ES_BATCH_SIZE_BYTES => settings.batch_size_bytes = parse_byte_size(value)?,
                ES_BATCH_WRITE_RETRY_COUNT => {
                    settings.retry_count = value.parse().with_context(|| {
                        format!("💀 {} = '{}' must be a non-negative number of retries", key, value)
                    })?;
                }
                ES_BATCH_WRITE_RETRY_WAIT => {
                    settings.retry_wait = humantime::parse_duration(value)
                        .with_context(|| format!("💀 {} = '{}' is not a duration like '10s'", key, value))?;
                }
                ES_BATCH_WRITE_REFRESH => settings.refresh_after_write = parse_bool(key, value)?,
                ES_INDEX_AUTO_CREATE => settings.index_auto_create = parse_bool(key, value)?,
                ES_NODES => settings.nodes = parse_nodes(value),
                ES_NET_HTTP_AUTH_USER => settings.auth_user = non_empty(value),
                ES_NET_HTTP_AUTH_PASS => settings.auth_pass = non_empty(value),
                unknown => {
                    warn!(
                        "⚠️ Ignoring unknown property '{}'. Known es.* keys: {}",
                        unknown,
                        KNOWN_KEYS.join(", ")
                    );
                }
            }
        }
        if settings.batch_size_entries == 0 {
            bail!("💀 {} must be at least 1", ES_BATCH_SIZE_ENTRIES);
        }
        if settings.batch_size_bytes == 0 {
            bail!("💀 {} must be at least 1b", ES_BATCH_SIZE_BYTES);
        }
        if settings.write_operation.requires_id() && settings.mapping_id.is_none() {
            bail!(
                "💀 {} = {} needs {} so there's a document to update",
                ES_WRITE_OPERATION,
                settings.write_operation,
                ES_MAPPING_ID
            );
        }
        Ok(settings)
    }

    /// 🔍 The renamed key for a field, if `es.mapping.names` renames it.
    pub fn renamed(&self, field: &str) -> Option<&str> {
        self.mapping_names
            .iter()
            .find(|(original, _)| original == field)
            .map(|(_, renamed)| renamed.as_str())
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// 📡 `"es1:9200, es2:9200"` → `Some("http://es1:9200")`. One node is enough for a client.
fn parse_nodes(value: &str) -> Option<String> {
    parse_list(value).into_iter().next().map(|node| {
        if node.starts_with("http://") || node.starts_with("https://") {
            node
        } else {
            format!("http://{}", node)
        }
    })
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// 🏷️ `"url:address, name:artist"` → `[(url, address), (name, artist)]`
pub fn parse_mapping_names(value: &str) -> Result<Vec<(String, String)>> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for item in parse_list(value) {
        let (original, renamed) = item
            .split_once(':')
            .with_context(|| format!("💀 {} entry '{}' must look like 'original:renamed'", ES_MAPPING_NAMES, item))?;
        let (original, renamed) = (original.trim(), renamed.trim());
        if original.is_empty() || renamed.is_empty() {
            bail!("💀 {} entry '{}' has an empty side", ES_MAPPING_NAMES, item);
        }
        if pairs.iter().any(|(o, _)| o == original) {
            bail!("💀 {} renames '{}' twice", ES_MAPPING_NAMES, original);
        }
        if pairs.iter().any(|(_, r)| r == renamed) {
            bail!("💀 {} maps two fields onto '{}'", ES_MAPPING_NAMES, renamed);
        }
        pairs.push((original.to_string(), renamed.to_string()));
    }
    Ok(pairs)
}

/// 📏 `"1mb"`, `"512kb"`, `"100b"`, `"2gb"`, or a bare byte count.
pub fn parse_byte_size(value: &str) -> Result<usize> {
    let lowered = value.trim().to_ascii_lowercase();
    let split = lowered
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(lowered.len());
    let (digits, unit) = lowered.split_at(split);
    let amount: usize = digits
        .parse()
        .with_context(|| format!("💀 '{}' is not a byte size like '1mb'", value))?;
    let multiplier: usize = match unit.trim() {
        "" | "b" => 1,
        "k" | "kb" => 1024,
        "m" | "mb" => 1024 * 1024,
        "g" | "gb" => 1024 * 1024 * 1024,
        other => bail!("💀 '{}' has an unknown byte unit '{}' (b, kb, mb, gb)", value, other),
    };
    amount
        .checked_mul(multiplier)
        .with_context(|| format!("💀 '{}' overflows. That is a lot of bytes.", value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => bail!("💀 {} = '{}' should be yes/no or true/false", key, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn the_one_where_nothing_is_configured_and_defaults_show_up() -> Result<()> {
        let settings = EsSettings::from_properties(&Properties::new())?;
        assert_eq!(settings, EsSettings::default());
        assert_eq!(settings.batch_size_entries, 1000);
        assert_eq!(settings.retry_wait, Duration::from_secs(10));
        Ok(())
    }

    #[test]
    fn the_one_where_url_becomes_address() -> Result<()> {
        let settings = EsSettings::from_properties(&props(&[(ES_MAPPING_NAMES, "url:address")]))?;
        assert_eq!(settings.renamed("url"), Some("address"));
        assert_eq!(settings.renamed("name"), None);

        let many = parse_mapping_names(" url : address , name:artist ")?;
        assert_eq!(many.len(), 2);
        assert_eq!(many[1], ("name".to_string(), "artist".to_string()));
        Ok(())
    }

    #[test]
    fn the_one_where_rename_typos_are_caught() {
        assert!(parse_mapping_names("url").is_err());
        assert!(parse_mapping_names("url:").is_err());
        assert!(parse_mapping_names("url:a,url:b").is_err());
        assert!(parse_mapping_names("url:a,name:a").is_err());
    }

    #[test]
    fn the_one_where_sizes_and_durations_read_like_english() -> Result<()> {
        let settings = EsSettings::from_properties(&props(&[
            (ES_BATCH_SIZE_BYTES, "512kb"),
            (ES_BATCH_SIZE_ENTRIES, "50"),
            (ES_BATCH_WRITE_RETRY_WAIT, "250ms"),
            (ES_BATCH_WRITE_RETRY_COUNT, "5"),
            (ES_BATCH_WRITE_REFRESH, "false"),
            (ES_INDEX_AUTO_CREATE, "no"),
            (ES_MAPPING_EXCLUDE, "ts, id"),
            ("not.es.at.all", "ignored"),
            ("es.some.future.knob", "warned"),
        ]))?;
        assert_eq!(settings.batch_size_bytes, 512 * 1024);
        assert_eq!(settings.batch_size_entries, 50);
        assert_eq!(settings.retry_wait, Duration::from_millis(250));
        assert_eq!(settings.retry_count, 5);
        assert!(!settings.refresh_after_write);
        assert!(!settings.index_auto_create);
        assert_eq!(settings.mapping_exclude, ["ts", "id"]);

        assert_eq!(parse_byte_size("100")?, 100);
        assert_eq!(parse_byte_size("1MB")?, 1024 * 1024);
        assert!(parse_byte_size("1tb").is_err());
        assert!(parse_byte_size("mb").is_err());
        Ok(())
    }

    #[test]
    fn the_one_where_update_without_an_id_is_a_non_starter() -> Result<()> {
        assert!(EsSettings::from_properties(&props(&[(ES_WRITE_OPERATION, "upsert")])).is_err());
        let ok = EsSettings::from_properties(&props(&[
            (ES_WRITE_OPERATION, "Upsert"),
            (ES_MAPPING_ID, "id"),
        ]))?;
        assert_eq!(ok.write_operation, WriteOperation::Upsert);
        assert_eq!(ok.write_operation.action(), "update");
        assert!(EsSettings::from_properties(&props(&[(ES_WRITE_OPERATION, "delete")])).is_err());
        assert!(EsSettings::from_properties(&props(&[(ES_BATCH_SIZE_ENTRIES, "0")])).is_err());
        Ok(())
    }

    #[test]
    fn the_one_where_the_properties_know_where_the_cluster_is() -> Result<()> {
        let settings = EsSettings::from_properties(&props(&[
            (ES_NODES, "es1:9200, es2:9200"),
            (ES_NET_HTTP_AUTH_USER, "elastic"),
            (ES_NET_HTTP_AUTH_PASS, "changeme"),
        ]))?;
        assert_eq!(settings.nodes.as_deref(), Some("http://es1:9200"));
        assert_eq!(settings.auth_user.as_deref(), Some("elastic"));
        assert_eq!(settings.auth_pass.as_deref(), Some("changeme"));

        let tls = EsSettings::from_properties(&props(&[(ES_NODES, "https://secure:9243")]))?;
        assert_eq!(tls.nodes.as_deref(), Some("https://secure:9243"));
        Ok(())
    }
}
