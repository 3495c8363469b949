//! End-to-end ingest runs against a mock API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use armory_api::coordinator::QuotaCoordinator;
use armory_api::credentials::CredentialRotator;
use armory_api::governor::RateGovernor;
use armory_api::Credential;
use armory_catalog::CollectionDefinition;
use armory_catalog::definition::parse_collection_toml;
use armory_database::{DocumentStore, DuckDbStore, MemoryStore};
use armory_database_models::NaturalKey;
use armory_ingest::Ingester;
use armory_ingest::config::IngestConfig;
use armory_ingest_models::IngestOptions;
use serde_json::json;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn items(min_id: i64, max_id: i64) -> CollectionDefinition {
    parse_collection_toml(
        "items.toml",
        &format!(
            r#"
                id = "items"
                name = "Items"
                endpoint = "/wow/item/{{id}}"

                [kind]
                type = "data"
                min_id = {min_id}
                max_id = {max_id}
            "#
        ),
    )
    .unwrap()
}

fn mounts() -> CollectionDefinition {
    parse_collection_toml(
        "mounts.toml",
        r#"
            id = "mounts"
            name = "Mounts"
            endpoint = "/wow/mount/"
            natural_key = "spellId"
            records_path = "mounts"

            [kind]
            type = "collection"
        "#,
    )
    .unwrap()
}

fn config(server: &MockServer) -> IngestConfig {
    IngestConfig {
        base_url: server.uri(),
        locale: "en_US".to_string(),
        api_keys: Vec::new(),
        oauth_clients: Vec::new(),
        token_url: String::new(),
        reindex_url: None,
    }
}

fn ingester(
    config: IngestConfig,
    keys: &[&str],
    store: Arc<dyn DocumentStore>,
    options: IngestOptions,
) -> Ingester {
    let credentials = keys.iter().map(|k| Credential::api_key(*k)).collect();
    let coordinator = Arc::new(QuotaCoordinator::new(
        CredentialRotator::new(credentials).unwrap(),
        RateGovernor::default(),
    ));
    Ingester::new(reqwest::Client::new(), coordinator, store, config, options)
}

fn single_worker() -> IngestOptions {
    IngestOptions {
        workers: 1,
        ..IngestOptions::default()
    }
}

fn api_key(request: &Request) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == "apikey")
        .map(|(_, v)| v.into_owned())
}

/// Responds with a minimal item document whose `id` matches the path.
struct EchoItem;

impl Respond for EchoItem {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id: i64 = request
            .url
            .path()
            .rsplit('/')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(-1);
        ResponseTemplate::new(200).set_body_json(json!({"id": id, "name": format!("item {id}")}))
    }
}

#[tokio::test]
async fn exhausted_quota_rotates_for_next_task() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wow/item/5"))
        .and(query_param("apikey", "A"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": 5}))
                .insert_header("x-plan-qps-current", "1")
                .insert_header("x-plan-qps-allotted", "100")
                .insert_header("x-plan-quota-current", "999")
                .insert_header("x-plan-quota-allotted", "1000"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wow/item/6"))
        .and(query_param("apikey", "B"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 6})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::default());
    let ingester = ingester(config(&server), &["A", "B"], store.clone(), single_worker());
    let summary = ingester.run(&[items(5, 6)]).await;

    assert_eq!(summary.persisted, 2);
    assert_eq!(ingester.coordinator().active_index(), 1);
    assert_eq!(ingester.coordinator().lease().credential.secret(), "B");
    assert!(store.get("items", &NaturalKey::Int(6)).await.unwrap().is_some());
}

#[tokio::test]
async fn invalid_id_is_skipped_and_run_continues() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wow/item/42"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wow/item/43"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 43, "name": "Fishing Pole"})))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::default());
    let summary = ingester(config(&server), &["A"], store.clone(), IngestOptions::default())
        .run(&[items(42, 43)])
        .await;

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.persisted, 1);
    assert_eq!(summary.failed, 0);
    assert!(store.get("items", &NaturalKey::Int(42)).await.unwrap().is_none());
    assert!(store.get("items", &NaturalKey::Int(43)).await.unwrap().is_some());
}

#[tokio::test]
async fn throttled_request_is_retried_with_same_credential() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wow/item/7"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wow/item/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::default());
    let ingester = ingester(config(&server), &["A", "B"], store.clone(), single_worker());

    let start = Instant::now();
    let summary = ingester.run(&[items(7, 7)]).await;
    assert!(start.elapsed() >= Duration::from_millis(1000));

    assert_eq!(summary.persisted, 1);
    assert_eq!(ingester.coordinator().active_index(), 0);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| api_key(r).as_deref() == Some("A")));
}

#[tokio::test]
async fn resumes_after_highest_stored_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/wow/item/\d+$"))
        .respond_with(EchoItem)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::default());
    for id in 1..=3 {
        store.upsert("items", "id", &json!({"id": id})).await.unwrap();
    }

    let summary = ingester(config(&server), &["A"], store.clone(), IngestOptions::default())
        .run(&[items(1, 6)])
        .await;
    assert_eq!(summary.persisted, 3);

    let mut requested: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    requested.sort();
    assert_eq!(requested, vec!["/wow/item/4", "/wow/item/5", "/wow/item/6"]);
    assert_eq!(store.max_key("items").await.unwrap(), Some(6));
}

#[tokio::test]
async fn complete_collection_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(EchoItem)
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::default());
    store.upsert("items", "id", &json!({"id": 10})).await.unwrap();

    let summary = ingester(config(&server), &["A"], store, IngestOptions::default())
        .run(&[items(0, 10)])
        .await;
    assert_eq!(summary.completed, 0);
}

#[tokio::test]
async fn listing_is_stored_by_natural_key_in_duckdb() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wow/mount/"))
        .and(query_param("locale", "en_US"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mounts": [
                {"spellId": 458, "name": "Brown Horse"},
                {"spellId": 470, "name": "Black Stallion"}
            ]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DuckDbStore::open(&dir.path().join("armory.duckdb")).unwrap());

    for _ in 0..2 {
        let summary = ingester(config(&server), &["A"], store.clone(), IngestOptions::default())
            .run(&[mounts()])
            .await;
        assert_eq!(summary.documents, 2);
    }

    assert_eq!(store.count("mounts").await.unwrap(), 2);
    assert_eq!(store.max_key("mounts").await.unwrap(), Some(470));
    assert_eq!(
        store.get_meta("mounts.record_count").await.unwrap().as_deref(),
        Some("2")
    );
}

#[tokio::test]
async fn reindex_hook_fires_after_drain() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/wow/item/\d+$"))
        .respond_with(EchoItem)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/reindex"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.reindex_url = Some(format!("{}/reindex", server.uri()));

    let summary = ingester(config, &["A"], Arc::new(MemoryStore::default()), IngestOptions::default())
        .run(&[items(1, 3)])
        .await;
    assert_eq!(summary.persisted, 3);
}

#[tokio::test]
async fn many_workers_store_every_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/wow/item/\d+$"))
        .respond_with(EchoItem)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::default());
    let summary = ingester(config(&server), &["A"], store.clone(), IngestOptions::default())
        .run(&[items(0, 199)])
        .await;

    assert_eq!(summary.completed, 200);
    assert_eq!(store.count("items").await.unwrap(), 200);
    let keys = store.integer_keys("items", 0, 199).await.unwrap();
    assert_eq!(keys.len(), 200);
}
