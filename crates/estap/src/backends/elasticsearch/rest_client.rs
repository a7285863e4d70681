//! 🌐 The REST client: the five endpoints estap actually talks to.
//!
//! Nothing fancy. A `reqwest::Client` with timeouts, the base URL, auth applied
//! to every request, and errors that say which URL answered what.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, trace};

use super::ElasticsearchConnection;
use crate::mapping::Mapping;
use crate::resource::Resource;

/// 🏷️ `GET /` tells us who we're talking to.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClusterInfo {
    #[serde(default)]
    pub cluster_name: Option<String>,
    pub version: ClusterVersion,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClusterVersion {
    pub number: String,
}

impl ClusterInfo {
    /// 🔢 `"6.8.23"` → 6
    pub fn major_version(&self) -> Result<u32> {
        let major = self.version.number.split('.').next().unwrap_or_default();
        major.parse().with_context(|| {
            format!(
                "💀 The cluster reports version '{}', which doesn't start with a number",
                self.version.number
            )
        })
    }

    /// 🏷️ Mapping types went away in 7.0.
    pub fn supports_types(&self) -> Result<bool> {
        Ok(self.major_version()? < 7)
    }
}

/// 📬 How a `/_bulk` call went, before anyone decides whether to retry.
#[derive(Debug)]
pub(crate) enum BulkOutcome {
    /// 🐢 The whole request bounced (429/503). Nothing was written.
    Throttled { status: StatusCode, body: String },
    Completed(BulkResponse),
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    /// 📋 One `{ "<action>": item }` per entry, in request order.
    #[serde(default)]
    pub items: Vec<BTreeMap<String, BulkItem>>,
}

impl BulkResponse {
    /// 📋 Unwrap the action key so callers see one item per entry.
    pub(crate) fn into_items(self) -> Vec<Option<BulkItem>> {
        self.items
            .into_iter()
            .map(|item| item.into_values().next())
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct BulkItem {
    pub status: u16,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl BulkItem {
    pub(crate) fn failed(&self) -> bool {
        self.error.is_some() || self.status >= 300
    }

    pub(crate) fn rejected(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS.as_u16()
    }

    /// 📝 `"mapper_parsing_exception: failed to parse field [ts]"`, or the raw error.
    pub(crate) fn reason(&self) -> String {
        match &self.error {
            Some(error) => match (
                error.get("type").and_then(|t| t.as_str()),
                error.get("reason").and_then(|r| r.as_str()),
            ) {
                (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
                _ => error.to_string(),
            },
            None => format!("status {}", self.status),
        }
    }
}

/// 🌐 A thin, authenticated Elasticsearch REST client.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    connection: ElasticsearchConnection,
}

impl RestClient {
    pub fn new(connection: ElasticsearchConnection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context(
                "💀 The HTTP client refused to be born. Probably a missing TLS cert or a cursed \
                system OpenSSL. Either way: tragic.",
            )?;
        Ok(Self { client, connection })
    }

    pub fn url(&self) -> &str {
        self.connection.url.trim_end_matches('/')
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.url(), path.trim_start_matches('/'));
        trace!("🌐 {} {}", method, url);
        let request = self.client.request(method, url);
        if let Some(api_key) = &self.connection.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(username) = &self.connection.username {
            request.basic_auth(username, self.connection.password.as_ref())
        } else {
            request
        }
    }

    /// 🏷️ `GET /`: name and version of the cluster.
    pub async fn cluster_info(&self) -> Result<ClusterInfo> {
        let response = self.request(Method::GET, "/").send().await.with_context(|| {
            format!(
                "💀 Could not reach Elasticsearch at '{}'. We knocked. Nobody's home.",
                self.url()
            )
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("💀 '{}' answered the root ping with {}: {}", self.url(), status, body);
        }
        response
            .json::<ClusterInfo>()
            .await
            .with_context(|| format!("💀 '{}' answered, but not like an Elasticsearch cluster", self.url()))
    }

    /// 🔍 `HEAD /<index>`: 200 yes, 404 no, anything else is an error.
    pub async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self
            .request(Method::HEAD, index)
            .send()
            .await
            .with_context(|| format!("💀 Checking whether index '{}' exists never got an answer", index))?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => bail!("💀 Checking index '{}' returned {}", index, status),
        }
    }

    /// 📡 `POST /_bulk` with an NDJSON body.
    pub(crate) async fn bulk(&self, payload: String) -> Result<BulkOutcome> {
        let bytes = payload.len();
        let response = self
            .request(Method::POST, "_bulk")
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()
            .await
            .context(
                "💀 The bulk request never made it to Elasticsearch. We launched the payload into \
                the network and the network was not vibing with it. Check connectivity and timeouts.",
            )?;
        let status = response.status();
        debug!("📡 /_bulk ({} bytes) → {}", bytes, status);
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            return Ok(BulkOutcome::Throttled { status, body });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "💀 The bulk request arrived, but Elasticsearch said '{}'. The body read: '{}'",
                status,
                body
            );
        }
        let parsed = response
            .json::<BulkResponse>()
            .await
            .context("💀 The /_bulk response wasn't the JSON we were promised")?;
        Ok(BulkOutcome::Completed(parsed))
    }

    /// 🔄 `POST /<a>,<b>/_refresh` so freshly written documents are searchable.
    pub async fn refresh<I, S>(&self, indices: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = indices
            .into_iter()
            .map(|index| index.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        if joined.is_empty() {
            return Ok(());
        }
        let response = self
            .request(Method::POST, &format!("{}/_refresh", joined))
            .send()
            .await
            .with_context(|| format!("💀 Refreshing '{}' never got an answer", joined))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("💀 Refreshing '{}' returned {}: {}", joined, status, body);
        }
        debug!("🔄 Refreshed {}", joined);
        Ok(())
    }

    /// 🗺️ `GET /<index>/_mapping[/<type>]`, parsed.
    ///
    /// Pass a concrete resource, e.g. what a pattern resolved to: `cascading-hadoop/pattern-12`.
    pub async fn get_mapping(&self, resource: &str) -> Result<Mapping> {
        let resource = Resource::parse(resource)?;
        let path = match resource.doc_type() {
            Some(doc_type) => format!("{}/_mapping/{}", resource.index(), doc_type),
            None => format!("{}/_mapping", resource.index()),
        };
        let response = self
            .request(Method::GET, &path)
            .send()
            .await
            .with_context(|| format!("💀 Fetching the mapping of '{}' never got an answer", resource))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            bail!("💀 No mapping for '{}': the index (or type) does not exist", resource);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("💀 Fetching the mapping of '{}' returned {}: {}", resource, status, body);
        }
        let body: serde_json::Value = response
            .json()
            .await
            .with_context(|| format!("💀 The mapping of '{}' came back as something other than JSON", resource))?;
        Mapping::parse(&resource, &body)
    }
}
