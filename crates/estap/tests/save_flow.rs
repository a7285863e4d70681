//! 🧪 Save flows, end to end: a tab-separated file, a pipe, an `EsTap`, and a cluster
//! that infers mappings from what it's sent, the way a 6.x node with dynamic mapping would.
//!
//! 🎬 *[the cluster is a wiremock server. it doesn't know that. don't tell it.]*

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use estap::{
    DelimitedTap, ElasticsearchConnection, EsTap, Fields, FlowConnector, FlowDef, Pipe, PipeOp, Properties,
};
use serde_json::{Map, Value as Json, json};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const ARTISTS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/artists.dat");

/// (index, type)
type TypeKey = (String, String);

#[derive(Debug, Default)]
struct ClusterState {
    mappings: BTreeMap<TypeKey, BTreeMap<String, &'static str>>,
    documents: BTreeMap<TypeKey, Vec<Json>>,
}

/// 🦆 A cluster with just enough brain to do dynamic mapping.
#[derive(Debug, Clone, Default)]
struct FakeCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl FakeCluster {
    async fn start(version: &str) -> (MockServer, FakeCluster) {
        let server = MockServer::start().await;
        let cluster = FakeCluster::default();
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cluster_name": "elasticsearch",
                "version": {"number": version}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(BulkApi(cluster.clone()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/[^/]+/_refresh$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"_shards": {"total": 2, "successful": 1, "failed": 0}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/[^/]+/_mapping(/[^/]+)?$"))
            .respond_with(MappingApi(cluster.clone()))
            .mount(&server)
            .await;
        (server, cluster)
    }

    fn documents(&self, index: &str, doc_type: &str) -> Vec<Json> {
        let state = self.state.lock().expect("cluster state");
        state
            .documents
            .get(&(index.to_string(), doc_type.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn types_of(&self, index: &str) -> Vec<String> {
        let state = self.state.lock().expect("cluster state");
        state
            .mappings
            .keys()
            .filter(|(idx, _)| idx == index)
            .map(|(_, doc_type)| doc_type.clone())
            .collect()
    }
}

fn looks_like_a_date(text: &str) -> bool {
    DateTime::parse_from_rfc3339(text).is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
}

fn dynamic_type(value: &Json) -> &'static str {
    match value {
        Json::Bool(_) => "boolean",
        Json::Number(n) if n.is_i64() || n.is_u64() => "long",
        Json::Number(_) => "float",
        Json::String(text) if looks_like_a_date(text) => "date",
        _ => "text",
    }
}

fn field_mapping(es_type: &str) -> Json {
    match es_type {
        "text" => json!({"type": "text", "fields": {"keyword": {"type": "keyword", "ignore_above": 256}}}),
        other => json!({"type": other}),
    }
}

struct BulkApi(FakeCluster);

impl Respond for BulkApi {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body = String::from_utf8_lossy(&request.body).to_string();
        let mut lines = body.lines().filter(|line| !line.is_empty());
        let mut guard = self.0.state.lock().expect("cluster state");
        let state = &mut *guard;
        let mut items = Vec::new();
        while let (Some(action), Some(source)) = (lines.next(), lines.next()) {
            let action: Json = serde_json::from_str(action).expect("action line is JSON");
            let (op, meta) = action
                .as_object()
                .and_then(|object| object.iter().next())
                .expect("action line has one operation");
            let index = meta["_index"].as_str().expect("_index").to_string();
            let doc_type = meta.get("_type").and_then(Json::as_str).unwrap_or("_doc").to_string();
            let document: Json = serde_json::from_str(source).expect("source line is JSON");
            let key = (index.clone(), doc_type.clone());

            let mapping = state.mappings.entry(key.clone()).or_default();
            for (field, value) in document.as_object().expect("document is an object") {
                mapping.entry(field.clone()).or_insert_with(|| dynamic_type(value));
            }
            state.documents.entry(key).or_default().push(document);

            let mut item = Map::new();
            item.insert(op.clone(), json!({"_index": index, "_type": doc_type, "status": 201}));
            items.push(Json::Object(item));
        }
        ResponseTemplate::new(200).set_body_json(json!({"took": 1, "errors": false, "items": items}))
    }
}

struct MappingApi(FakeCluster);

impl Respond for MappingApi {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let segments: Vec<&str> = request.url.path().trim_start_matches('/').split('/').collect();
        let index = segments[0];
        let wanted = segments.get(2).copied();

        let state = self.0.state.lock().expect("cluster state");
        let mut types = Map::new();
        for ((idx, doc_type), fields) in &state.mappings {
            if idx != index || wanted.is_some_and(|wanted| wanted != doc_type) {
                continue;
            }
            let properties: Map<String, Json> = fields
                .iter()
                .map(|(name, es_type)| (name.clone(), field_mapping(es_type)))
                .collect();
            types.insert(doc_type.clone(), json!({"properties": properties}));
        }
        if types.is_empty() {
            return ResponseTemplate::new(404).set_body_json(json!({"error": "index_not_found_exception", "status": 404}));
        }
        let mut body = Map::new();
        body.insert(index.to_string(), json!({"mappings": types}));
        ResponseTemplate::new(200).set_body_json(Json::Object(body))
    }
}

fn connection(server: &MockServer) -> ElasticsearchConnection {
    ElasticsearchConnection::new(server.uri())
}

fn artist_fields() -> Result<Fields> {
    Fields::new(["id", "name", "url", "picture", "ts"])
}

async fn mapping_of(server: &MockServer, resource: &str) -> Result<String> {
    Ok(estap::fetch_mapping(connection(server), resource)
        .await?
        .skip_headers()
        .to_string())
}

#[tokio::test]
async fn the_one_where_artists_are_written_and_the_mapping_checks_out() -> Result<()> {
    let (server, cluster) = FakeCluster::start("6.8.23").await;

    let input = DelimitedTap::new(ARTISTS, artist_fields()?);
    let output = EsTap::new("cascading-hadoop/artists", Some(Fields::new(["name", "url", "picture"])?))
        .with_connection(connection(&server));
    let pipe = Pipe::new("copy");
    let flow_def = FlowDef::new().add_source(&pipe, input).add_tail_sink(&pipe, output);

    let stats = FlowConnector::new(Properties::new()).connect(flow_def)?.complete().await?;

    assert_eq!(stats.tuples_read, 14);
    assert_eq!(stats.documents_written, 14);
    assert_eq!(stats.indices, ["cascading-hadoop"]);
    assert_eq!(
        mapping_of(&server, "cascading-hadoop/artists").await?,
        "artists=[name=STRING, picture=STRING, url=STRING]"
    );
    let documents = cluster.documents("cascading-hadoop", "artists");
    assert_eq!(documents.len(), 14);
    assert_eq!(documents[0]["name"], "MALICE MIZER");
    assert!(documents[0].get("id").is_none());
    Ok(())
}

#[tokio::test]
async fn the_one_where_url_goes_by_address_now() -> Result<()> {
    let (server, cluster) = FakeCluster::start("6.8.23").await;

    let input = DelimitedTap::new(ARTISTS, artist_fields()?);
    let output = EsTap::with_query(
        "cascading-hadoop/alias",
        "",
        Some(Fields::new(["name", "url", "picture"])?),
    )
    .with_connection(connection(&server));
    let pipe = Pipe::each(
        Pipe::new("copy"),
        PipeOp::Identity(Fields::new(["garbage", "name", "url", "picture", "ts"])?),
    );
    let properties: Properties = [("es.mapping.names".to_string(), "url:address".to_string())]
        .into_iter()
        .collect();
    let flow_def = FlowDef::new().add_source(&pipe, input).add_tail_sink(&pipe, output);

    FlowConnector::new(properties).connect(flow_def)?.complete().await?;

    assert_eq!(
        mapping_of(&server, "cascading-hadoop/alias").await?,
        "alias=[address=STRING, name=STRING, picture=STRING]"
    );
    let documents = cluster.documents("cascading-hadoop", "alias");
    assert_eq!(documents[6]["address"], "http://www.last.fm/music/Marilyn+Manson");
    assert!(documents.iter().all(|doc| doc.get("url").is_none() && doc.get("garbage").is_none()));
    Ok(())
}

#[tokio::test]
async fn the_one_where_every_artist_gets_their_own_type() -> Result<()> {
    let (server, cluster) = FakeCluster::start("6.8.23").await;

    let input = DelimitedTap::new(ARTISTS, artist_fields()?);
    let output = EsTap::new(
        "cascading-hadoop/pattern-{id}",
        Some(Fields::new(["id", "name", "url", "picture"])?),
    )
    .with_connection(connection(&server));
    let properties: Properties = [("es.batch.size.entries".to_string(), "5".to_string())]
        .into_iter()
        .collect();

    let stats = FlowConnector::new(properties)
        .connect_parts(input, output, &Pipe::new("copy"))?
        .complete()
        .await?;

    assert_eq!(stats.documents_written, 14);
    assert_eq!(stats.bulk_requests, 3);
    assert_eq!(cluster.types_of("cascading-hadoop").len(), 14);
    assert_eq!(
        mapping_of(&server, "cascading-hadoop/pattern-12").await?,
        "pattern-12=[id=STRING, name=STRING, picture=STRING, url=STRING]"
    );
    let twelve = cluster.documents("cascading-hadoop", "pattern-12");
    assert_eq!(twelve.len(), 1);
    assert_eq!(twelve[0]["name"], "Behemoth");
    Ok(())
}

#[tokio::test]
async fn the_one_where_the_date_picks_the_type() -> Result<()> {
    let (server, cluster) = FakeCluster::start("6.8.23").await;

    let input = DelimitedTap::new(ARTISTS, artist_fields()?);
    let output = EsTap::new("cascading-hadoop/pattern-format-{ts:YYYY-MM-dd}", Some(artist_fields()?))
        .with_connection(connection(&server));

    FlowConnector::new(Properties::new())
        .connect_parts(input, output, &Pipe::new("copy"))?
        .complete()
        .await?;

    assert_eq!(cluster.types_of("cascading-hadoop"), ["pattern-format-2012-10-06"]);
    assert_eq!(
        mapping_of(&server, "cascading-hadoop/pattern-format-2012-10-06").await?,
        "pattern-format-2012-10-06=[id=STRING, name=STRING, picture=STRING, ts=DATE, url=STRING]"
    );
    Ok(())
}

#[tokio::test]
async fn the_one_where_a_typeless_cluster_refuses_typed_writes() -> Result<()> {
    let (server, cluster) = FakeCluster::start("7.17.9").await;

    let input = DelimitedTap::new(ARTISTS, artist_fields()?);
    let output = EsTap::new("cascading-hadoop/artists", None).with_connection(connection(&server));

    let err = FlowConnector::new(Properties::new())
        .connect_parts(input, output, &Pipe::new("copy"))?
        .complete()
        .await
        .expect_err("typed resource on a 7.x cluster");
    assert!(format!("{:#}", err).contains("removed types"), "got: {:#}", err);
    assert!(cluster.types_of("cascading-hadoop").is_empty());
    Ok(())
}

#[tokio::test]
async fn the_one_where_a_typeless_cluster_takes_the_index_alone() -> Result<()> {
    let (server, cluster) = FakeCluster::start("7.17.9").await;

    let input = DelimitedTap::new(ARTISTS, artist_fields()?);
    let output = EsTap::new("artists-{ts:YYYY.MM}", Some(Fields::new(["name", "ts"])?))
        .with_connection(connection(&server));

    let stats = FlowConnector::new(Properties::new())
        .connect_parts(input, output, &Pipe::new("copy"))?
        .complete()
        .await?;

    assert_eq!(stats.indices, ["artists-2012.10"]);
    assert_eq!(cluster.documents("artists-2012.10", "_doc").len(), 14);
    assert_eq!(mapping_of(&server, "artists-2012.10").await?, "artists-2012.10=[name=STRING, ts=DATE]");
    Ok(())
}
