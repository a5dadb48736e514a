//! Lifecycle tests for `filess_database` against a mocked API

use std::collections::HashMap;
use std::time::Duration;

use filess_core::diagnostic::Severity;
use filess_core::provider::Provider;
use filess_core::resource::{Resource, ResourceId, State, Value};
use filess_provider::resources::*;
use filess_provider::{ApiClient, Cancellation, DatabaseController, FilessProvider, WaitConfig};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_wait() -> WaitConfig {
    WaitConfig {
        delay: Duration::from_millis(1),
        poll_interval: Duration::from_millis(1),
        timeout: Duration::from_secs(10),
    }
}

fn provider(server: &MockServer, wait: WaitConfig) -> FilessProvider {
    let client = ApiClient::new(server.uri(), "test-token").unwrap();
    FilessProvider::with_controller(
        DatabaseController::new(client)
            .with_wait_config(wait)
            .with_terminal_notifications(false),
    )
}

fn database_resource() -> Resource {
    Resource::new(DATABASE_TYPE, "main")
        .with_attribute(ORGANIZATION_SLUG, Value::from("acme"))
        .with_attribute(NAMESPACE_SLUG, Value::from("prod"))
        .with_attribute(NAME, Value::from("orders"))
        .with_attribute(ENGINE_ID, Value::from("3"))
        .with_attribute(REGION_ID, Value::from("1"))
        .with_attribute(
            DATABASE_PLAN,
            Value::Map(HashMap::from([(
                BILLABLE_ITEMS.to_string(),
                Value::List(vec![Value::Map(HashMap::from([
                    (BILLABLE_ITEM_ID.to_string(), Value::from("bi1")),
                    (QUANTITY.to_string(), Value::Int(2)),
                ]))]),
            )])),
        )
}

fn pending_database() -> serde_json::Value {
    json!({
        "msg": "ok",
        "data": {
            "name": "orders",
            "status": "deploying",
            "engineId": 3,
            "regionId": 1,
            "databaseParams": [],
            "databaseUsers": []
        }
    })
}

fn deployed_database() -> serde_json::Value {
    json!({
        "msg": "ok",
        "data": {
            "name": "orders",
            "description": "",
            "status": "deployed",
            "engineId": 3,
            "regionId": 1,
            "createdAt": "2024-05-01T10:00:00Z",
            "databaseParams": [
                {"key": "database_hostname", "value": "orders.filess.io"},
                {"key": "database_service_port", "value": "3307"}
            ],
            "databaseUsers": [
                {"username": "app", "password": "app-pw", "role": "member"},
                {"username": "root", "password": "root-pw", "role": "root"}
            ]
        }
    })
}

async fn mount_create(server: &MockServer, data: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/api/v1/databases"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"msg": "created", "data": data})))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_create_waits_for_credentials() {
    let server = MockServer::start().await;
    mount_create(&server, json!({"database": {"id": 501}})).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/databases/501"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pending_database()))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/databases/501"))
        .respond_with(ResponseTemplate::new(200).set_body_json(deployed_database()))
        .mount(&server)
        .await;

    let outcome = provider(&server, fast_wait())
        .create(&database_resource())
        .await
        .expect("create should succeed");
    let state = outcome.value;

    assert!(outcome.diagnostics.is_empty());
    assert_eq!(state.identifier.as_deref(), Some("501"));
    assert_eq!(state.get_str(STATUS), "deployed");
    assert_eq!(state.get_str(DATABASE_HOSTNAME), "orders.filess.io");
    assert_eq!(state.get_str(DATABASE_SERVICE_PORT), "3307");
    assert_eq!(state.get_str(DATABASE_USERNAME), "root");
    assert_eq!(state.get_str(DATABASE_PASSWORD), "root-pw");
    assert_eq!(state.get_str(STRIPE_CHECKOUT_URL), "");
    assert_eq!(state.get_str(ENGINE_ID), "3");
    assert_eq!(state.get_str(ORGANIZATION_SLUG), "acme");

    // 1 create, 3 polls, 1 final read
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 5);
}

#[tokio::test]
async fn test_create_reports_payment_required() {
    let server = MockServer::start().await;
    mount_create(
        &server,
        json!({
            "database": {"id": "db-9"},
            "stripeCheckoutSession": {"url": "https://checkout.stripe.com/c/pay_1"}
        }),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/databases/db-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(deployed_database()))
        .mount(&server)
        .await;

    let outcome = provider(&server, fast_wait())
        .create(&database_resource())
        .await
        .unwrap();

    assert_eq!(outcome.value.identifier.as_deref(), Some("db-9"));
    assert_eq!(outcome.diagnostics.len(), 1);
    let diagnostic = &outcome.diagnostics[0];
    assert_eq!(diagnostic.severity, Severity::Warning);
    assert_eq!(diagnostic.summary, "Payment required");
    assert!(diagnostic.detail.contains("https://checkout.stripe.com/c/pay_1"));
    // Checkout completed, the backend no longer reports a session
    assert_eq!(outcome.value.get_str(STRIPE_CHECKOUT_URL), "");
}

#[tokio::test]
async fn test_create_times_out() {
    let server = MockServer::start().await;
    mount_create(&server, json!({"database": {"id": 501}})).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/databases/501"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pending_database()))
        .mount(&server)
        .await;

    let wait = WaitConfig {
        timeout: Duration::from_millis(50),
        poll_interval: Duration::from_millis(5),
        ..fast_wait()
    };
    let err = provider(&server, wait)
        .create(&database_resource())
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.identifier.as_deref(), Some("501"));
}

#[tokio::test]
async fn test_create_cancelled_during_wait_keeps_identifier() {
    let server = MockServer::start().await;
    mount_create(&server, json!({"database": {"id": 501}})).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/databases/501"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pending_database()))
        .mount(&server)
        .await;

    let (tx, cancellation) = Cancellation::new();
    let client = ApiClient::new(server.uri(), "test-token").unwrap();
    let provider = FilessProvider::with_controller(
        DatabaseController::new(client)
            .with_wait_config(fast_wait())
            .with_cancellation(cancellation)
            .with_terminal_notifications(false),
    );

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send_replace(true);
    });

    let err = tokio::time::timeout(Duration::from_secs(5), provider.create(&database_resource()))
        .await
        .expect("create should stop once cancelled")
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(!err.is_timeout());
    assert_eq!(err.identifier.as_deref(), Some("501"));
    assert!(err.message.contains("cancelled"));
}

#[tokio::test]
async fn test_create_cancelled_before_submission_sends_nothing() {
    let server = MockServer::start().await;

    let (tx, cancellation) = Cancellation::new();
    tx.send_replace(true);
    let client = ApiClient::new(server.uri(), "test-token").unwrap();
    let provider = FilessProvider::with_controller(
        DatabaseController::new(client).with_cancellation(cancellation),
    );

    let err = provider.create(&database_resource()).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(err.identifier.is_none());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_fails_on_poll_error() {
    let server = MockServer::start().await;
    mount_create(&server, json!({"database": {"id": 501}})).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/databases/501"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "database crashed"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = provider(&server, fast_wait())
        .create(&database_resource())
        .await
        .unwrap_err();

    assert!(!err.is_timeout());
    assert!(err.message.contains("API error (status 500): database crashed"));
}

#[tokio::test]
async fn test_read_not_found_clears_identity() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/databases/404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not found"})))
        .mount(&server)
        .await;

    let state = provider(&server, fast_wait())
        .read(&ResourceId::new(DATABASE_TYPE, "main"), "404")
        .await
        .expect("404 is not an error");

    assert!(!state.exists);
    assert!(state.identifier.is_none());
}

#[tokio::test]
async fn test_read_maps_fields() {
    let server = MockServer::start().await;

    let mut body = deployed_database();
    body["data"]["stripeCheckoutSession"] = json!({"url": "https://checkout.stripe.com/c/2"});
    Mock::given(method("GET"))
        .and(path("/api/v1/databases/501"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let state = provider(&server, fast_wait())
        .read(&ResourceId::new(DATABASE_TYPE, "main"), "501")
        .await
        .unwrap();

    assert!(state.exists);
    assert_eq!(state.identifier.as_deref(), Some("501"));
    assert_eq!(state.get_str(REGION_ID), "1");
    assert_eq!(state.get_str(CREATED_AT), "2024-05-01T10:00:00Z");
    assert_eq!(
        state.get_str(STRIPE_CHECKOUT_URL),
        "https://checkout.stripe.com/c/2"
    );
}

#[tokio::test]
async fn test_read_propagates_other_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let err = provider(&server, fast_wait())
        .read(&ResourceId::new(DATABASE_TYPE, "main"), "501")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("API error (status 403): forbidden"));
}

#[tokio::test]
async fn test_update_rereads_and_warns_on_rename() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/databases/501"))
        .respond_with(ResponseTemplate::new(200).set_body_json(deployed_database()))
        .expect(1)
        .mount(&server)
        .await;

    let id = ResourceId::new(DATABASE_TYPE, "main");
    let desired = database_resource().with_attribute(NAME, Value::from("invoices"));
    let outcome = provider(&server, fast_wait())
        .update(&id, "501", &State::not_found(id.clone()), &desired)
        .await
        .unwrap();

    assert_eq!(outcome.value.get_str(NAME), "orders");
    assert_eq!(outcome.value.get_str(DATABASE_PASSWORD), "root-pw");
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].summary, "Update not supported");
}

#[tokio::test]
async fn test_delete_treats_not_found_as_deleted() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/databases/501"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"msg": "deleted", "data": null})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/databases/502"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/databases/503"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"error": "database is locked"})))
        .mount(&server)
        .await;

    let provider = provider(&server, fast_wait());
    let id = ResourceId::new(DATABASE_TYPE, "main");

    provider.delete(&id, "501").await.expect("delete succeeds");
    provider.delete(&id, "502").await.expect("404 counts as deleted");
    let err = provider.delete(&id, "503").await.unwrap_err();
    assert!(err.message.contains("database is locked"));
}
