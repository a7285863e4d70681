//! 📡 Elasticsearch backend: the `EsTap` of a flow and the REST client behind it.
//!
//! 🧠 Knowledge graph:
//! - `ElasticsearchConnection`: url + auth, shared by the sink and by mapping lookups.
//! - `ElasticsearchSinkConfig`: connection + resource (maybe a pattern) + projection.
//!   `flow::EsTap` is this type.
//! - `RestClient`: the handful of endpoints we speak (`/`, `HEAD /<index>`, `/_bulk`,
//!   `/_refresh`, `/_mapping`).
//! - `ElasticsearchSink`: bulk writes with retry, auto-create checks, refresh on close.
//!
//! Auth precedence: API key beats basic auth. `es.nodes` and `es.net.http.auth.*`
//! properties beat whatever the config says.

mod elasticsearch_sink;
pub mod rest_client;

use serde::Deserialize;

use crate::common::Fields;
use crate::settings::EsSettings;

pub(crate) use elasticsearch_sink::ElasticsearchSink;
pub use rest_client::{ClusterInfo, RestClient};

/// 🔐 Where the cluster is and how to get in.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ElasticsearchConnection {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

impl Default for ElasticsearchConnection {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            api_key: None,
        }
    }
}

impl ElasticsearchConnection {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// 🔧 Apply `es.nodes` / `es.net.http.auth.*` on top of this connection.
    pub fn with_settings(mut self, settings: &EsSettings) -> Self {
        if let Some(nodes) = &settings.nodes {
            self.url = nodes.clone();
        }
        if let Some(user) = &settings.auth_user {
            self.username = Some(user.clone());
        }
        if let Some(pass) = &settings.auth_pass {
            self.password = Some(pass.clone());
        }
        self
    }
}

/// 🎯 The write side of an Elasticsearch tap.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ElasticsearchSinkConfig {
    #[serde(flatten, default)]
    pub connection: ElasticsearchConnection,
    /// 📍 `index`, `index/type`, or a pattern like `logs-{ts:yyyy.MM.dd}`.
    pub resource: String,
    /// 🔎 Read-side query. Writes ignore it; it's accepted so read and write taps look alike.
    #[serde(default)]
    pub query: Option<String>,
    /// 🎯 Document projection. Unset writes every field.
    #[serde(default)]
    pub fields: Option<Fields>,
}

impl ElasticsearchSinkConfig {
    pub fn new(resource: impl Into<String>, fields: Option<Fields>) -> Self {
        Self {
            connection: ElasticsearchConnection::default(),
            resource: resource.into(),
            query: None,
            fields,
        }
    }

    /// 🔎 Same as `new`, with a query string along for the ride. Empty is fine.
    pub fn with_query(resource: impl Into<String>, query: impl Into<String>, fields: Option<Fields>) -> Self {
        let query = query.into();
        Self {
            query: if query.is_empty() { None } else { Some(query) },
            ..Self::new(resource, fields)
        }
    }

    pub fn with_connection(mut self, connection: ElasticsearchConnection) -> Self {
        self.connection = connection;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Properties;

    #[test]
    fn the_one_where_properties_overrule_the_config() -> anyhow::Result<()> {
        let props: Properties = [
            ("es.nodes".to_string(), "es-prod:9200".to_string()),
            ("es.net.http.auth.user".to_string(), "elastic".to_string()),
        ]
        .into_iter()
        .collect();
        let settings = EsSettings::from_properties(&props)?;
        let connection = ElasticsearchConnection::new("http://localhost:9200").with_settings(&settings);
        assert_eq!(connection.url, "http://es-prod:9200");
        assert_eq!(connection.username.as_deref(), Some("elastic"));
        assert_eq!(connection.password, None);
        Ok(())
    }

    #[test]
    fn the_one_where_an_empty_query_is_no_query() {
        let tap = ElasticsearchSinkConfig::with_query("cascading-hadoop/artists", "", None);
        assert_eq!(tap.query, None);
        assert_eq!(tap.connection.url, "http://localhost:9200");
        let tap = ElasticsearchSinkConfig::with_query("idx", "?q=me*", None);
        assert_eq!(tap.query.as_deref(), Some("?q=me*"));
    }
}
