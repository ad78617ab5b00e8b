//! Tests for components/persistence.rs and the bundled backends

use std::sync::Arc;

use push_reconcile::backends::{MemoryStore, RestStore, RestStoreConfig};
use push_reconcile::components::{
    FailureReason, PersistenceBridge, ReconcileError, StoreError, SubscriptionIdentity,
    SubscriptionStore,
};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::FlakyStore;

fn identity(raw: &str) -> SubscriptionIdentity {
    SubscriptionIdentity::new(raw).unwrap()
}

#[tokio::test]
async fn test_memory_store_write_and_clear() {
    let store = Arc::new(MemoryStore::new());
    let bridge = PersistenceBridge::new(store.clone());

    assert!(!store.has_row("user-1"));

    bridge.persist("user-1", Some(&identity("abc123"))).await.unwrap();
    assert_eq!(store.record("user-1"), Some(identity("abc123")));
    assert_eq!(bridge.load("user-1").await.unwrap(), Some(identity("abc123")));

    bridge.persist("user-1", None).await.unwrap();
    assert!(store.has_row("user-1"));
    assert_eq!(store.record("user-1"), None);
    assert_eq!(store.write_count(), 2);
}

#[tokio::test]
async fn test_repeated_write_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let bridge = PersistenceBridge::new(store.clone());

    assert_ok!(bridge.persist("user-1", None).await);
    assert_ok!(bridge.persist("user-1", None).await);

    assert_eq!(store.record("user-1"), None);
    assert!(store.has_row("user-1"));
}

#[tokio::test]
async fn test_store_failure_maps_to_persistence_failure() {
    let store = Arc::new(FlakyStore::failing());
    let bridge = PersistenceBridge::new(store.clone());

    let error = assert_err!(bridge.persist("user-1", Some(&identity("abc123"))).await);

    assert_eq!(error.reason(), FailureReason::PersistenceFailure);
    assert!(error.reason().is_write_retryable());
    match error {
        ReconcileError::PersistenceFailure { user_id, source } => {
            assert_eq!(user_id, "user-1");
            assert!(matches!(source, StoreError::Status { status: 503, .. }));
        },
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!store.inner.has_row("user-1"));

    store.recover();
    bridge.persist("user-1", Some(&identity("abc123"))).await.unwrap();
    assert_eq!(store.inner.record("user-1"), Some(identity("abc123")));
}

#[test]
fn test_identity_rejects_blank_values() {
    assert!(SubscriptionIdentity::new("").is_none());
    assert!(SubscriptionIdentity::new("  \t").is_none());
    // vendor identifiers are opaque and kept as issued
    assert_eq!(identity(" abc123 ").as_str(), " abc123 ");
    assert!(serde_json::from_str::<SubscriptionIdentity>(r#""""#).is_err());
}

#[test]
fn test_rest_record_url() {
    let config = RestStoreConfig::new(
        Url::parse("https://project.example.co/rest/v1/").unwrap(),
        "anon-key",
    );
    let store = RestStore::new(config).unwrap();

    let url = store.record_url("42").unwrap();

    assert_eq!(
        url.as_str(),
        "https://project.example.co/rest/v1/profiles?select=push_subscription_id&id=eq.42"
    );
}

#[test]
fn test_rest_record_url_custom_columns() {
    let config = RestStoreConfig::new(
        Url::parse("https://project.example.co/rest/v1/").unwrap(),
        "anon-key",
    )
    .with_table("users")
    .with_columns("user_id", "onesignal_id");
    let store = RestStore::new(config).unwrap();

    let url = store.record_url("u-7").unwrap();

    assert_eq!(url.path(), "/rest/v1/users");
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("select".to_string(), "onesignal_id".to_string()),
            ("user_id".to_string(), "eq.u-7".to_string()),
        ]
    );
}

#[test]
fn test_rest_config_from_json() {
    let config: RestStoreConfig = serde_json::from_str(
        r#"{
            "base_url": "https://project.example.co/rest/v1/",
            "table": "profiles",
            "id_column": "id",
            "identity_column": "push_subscription_id",
            "api_key": "anon-key"
        }"#,
    )
    .unwrap();

    assert_eq!(config.timeout, None);
    assert_eq!(config.table, "profiles");
}

async fn rest_store(server: &MockServer) -> RestStore {
    let base = Url::parse(&format!("{}/rest/v1/", server.uri())).unwrap();
    RestStore::new(RestStoreConfig::new(base, "anon-key")).unwrap()
}

#[tokio::test]
async fn test_rest_read_sends_auth_and_parses_row() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("select", "push_subscription_id"))
        .and(query_param("id", "eq.user-1"))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer anon-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "push_subscription_id": "sub-1" }])),
        )
        .expect(1)
        .mount(&server)
        .await;
    let store = rest_store(&server).await;

    let record = store.get_subscription_identity("user-1").await.unwrap();

    assert_eq!(record, Some(identity("sub-1")));
}

#[tokio::test]
async fn test_rest_read_missing_or_cleared_row() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("id", "eq.cleared"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "push_subscription_id": null }])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("id", "eq.nobody"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    let store = rest_store(&server).await;

    assert_eq!(store.get_subscription_identity("cleared").await.unwrap(), None);
    assert_eq!(store.get_subscription_identity("nobody").await.unwrap(), None);
}

#[tokio::test]
async fn test_rest_write_patches_identity_column() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", "eq.user-1"))
        .and(header("apikey", "anon-key"))
        .and(header("prefer", "return=representation"))
        .and(body_json(json!({ "push_subscription_id": "sub-1" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "id": "user-1", "push_subscription_id": "sub-1" }])),
        )
        .expect(1)
        .mount(&server)
        .await;
    let store = rest_store(&server).await;

    assert_ok!(store.set_subscription_identity("user-1", Some(&identity("sub-1"))).await);
}

#[tokio::test]
async fn test_rest_clear_sends_null() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(body_json(json!({ "push_subscription_id": null })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "id": "user-1", "push_subscription_id": null }])),
        )
        .expect(1)
        .mount(&server)
        .await;
    let store = rest_store(&server).await;

    assert_ok!(store.set_subscription_identity("user-1", None).await);
}

#[tokio::test]
async fn test_rest_write_matching_no_row_fails() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    let store = Arc::new(rest_store(&server).await);
    let bridge = PersistenceBridge::new(store.clone());

    let error = assert_err!(store.set_subscription_identity("ghost", Some(&identity("sub-1"))).await);
    assert!(matches!(error, StoreError::MissingRow { ref user_id } if user_id == "ghost"));

    let error = assert_err!(bridge.persist("ghost", Some(&identity("sub-1"))).await);
    assert_eq!(error.reason(), FailureReason::PersistenceFailure);
}

#[tokio::test]
async fn test_rest_write_without_returned_rows_fails() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    let store = rest_store(&server).await;

    let error = assert_err!(store.set_subscription_identity("user-1", Some(&identity("sub-1"))).await);
    assert!(matches!(error, StoreError::Decode(_)));
}

#[tokio::test]
async fn test_rest_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    let store = rest_store(&server).await;

    let read = assert_err!(store.get_subscription_identity("user-1").await);
    assert!(matches!(read, StoreError::Status { status: 401, ref body } if body == "invalid api key"));

    let write = assert_err!(store.set_subscription_identity("user-1", None).await);
    assert!(matches!(write, StoreError::Status { status: 500, .. }));
}

#[tokio::test]
async fn test_rest_undecodable_read() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;
    let store = rest_store(&server).await;

    let error = assert_err!(store.get_subscription_identity("user-1").await);
    assert!(matches!(error, StoreError::Decode(_)));
}
