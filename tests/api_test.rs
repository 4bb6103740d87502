mod common;

use axum::body::Body;
use axum::Router;
use common::{intent_event, sign, test_config, FakeProvider, AUTH_TOKEN};
use http::{Request, StatusCode};
use payment_ledger::api::{router, AppState};
use payment_ledger::database::models::IntentStatus;
use payment_ledger::database::{InMemoryLedgerStore, LedgerStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    store: InMemoryLedgerStore,
    provider: Arc<FakeProvider>,
}

fn app() -> TestApp {
    let store = InMemoryLedgerStore::new();
    let provider = Arc::new(FakeProvider::new());
    let state = AppState::new(&test_config(), Arc::new(store.clone()), provider.clone());
    TestApp {
        router: router(state),
        store,
        provider,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", AUTH_TOKEN));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn webhook(payload: Vec<u8>, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/webhooks")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("Stripe-Signature", signature);
    }
    builder.body(Body::from(payload)).unwrap()
}

#[tokio::test]
async fn test_end_to_end_customer_intent_settlement() {
    let app = app();

    let (status, customer) = send(
        &app.router,
        authed(
            "POST",
            "/api/v1/customers",
            Some(json!({"email": "a@b.com", "name": "A"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let customer_id = customer["id"].as_str().unwrap().to_string();

    let (status, intent) = send(
        &app.router,
        authed(
            "POST",
            "/api/v1/payment-intents",
            Some(json!({"amount": 1000, "currency": "usd", "customer_id": customer_id})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(intent["status"], "requires_action");
    assert!(intent["client_secret"].as_str().is_some());
    let external_id = intent["payment_intent_id"].as_str().unwrap().to_string();

    let payload = intent_event("payment_intent.succeeded", &external_id, 1000, "succeeded");
    let signature = sign(&payload);
    let (status, body) = send(&app.router, webhook(payload, Some(signature))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success"}));

    let stored = app
        .store
        .find_intent_by_external_id(&external_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, IntentStatus::Succeeded);

    let (status, payments) = send(&app.router, authed("GET", "/api/v1/payments", None)).await;
    assert_eq!(status, StatusCode::OK);
    let payments = payments.as_array().unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0]["external_id"], external_id.as_str());
    assert_eq!(payments[0]["amount"], 1000);
}

#[tokio::test]
async fn test_webhook_signature_failures_are_bad_requests() {
    let app = app();
    let payload = intent_event("payment_intent.succeeded", "pi_x", 1000, "succeeded");

    let (status, body) = send(&app.router, webhook(payload.clone(), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());

    let mut tampered = payload.clone();
    let signature = sign(&payload);
    tampered[0] = b' ';
    let (status, _) = send(&app.router, webhook(tampered, Some(signature))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_malformed_payload_is_bad_request() {
    let app = app();
    let payload = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_x"}}}"#.to_vec();
    let signature = sign(&payload);

    let (status, _) = send(&app.router, webhook(payload, Some(signature))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_acknowledges_unknown_intent_and_kind() {
    let app = app();

    let payload = intent_event("payment_intent.succeeded", "pi_nobody", 1000, "succeeded");
    let signature = sign(&payload);
    let (status, _) = send(&app.router, webhook(payload, Some(signature))).await;
    assert_eq!(status, StatusCode::OK);

    let payload = serde_json::to_vec(&json!({
        "id": "evt_1", "type": "charge.dispute.created", "data": {"object": {"id": "dp_1"}}
    }))
    .unwrap();
    let signature = sign(&payload);
    let (status, body) = send(&app.router, webhook(payload, Some(signature))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    assert!(app.store.list_payments().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_api_routes_require_bearer_token() {
    let app = app();

    let request = Request::builder()
        .uri("/api/v1/customers")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/v1/customers")
        .header("authorization", "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app.router, authed("GET", "/api/v1/customers", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_health_reports_ledger() {
    let app = app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "development");
}

#[tokio::test]
async fn test_customer_errors_map_to_status_codes() {
    let app = app();
    let create = || {
        authed(
            "POST",
            "/api/v1/customers",
            Some(json!({"email": "dup@example.com", "name": "Dup"})),
        )
    };

    let (status, customer) = send(&app.router, create()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&app.router, create()).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app.router,
        authed(
            "POST",
            "/api/v1/customers",
            Some(json!({"email": "not-an-email", "name": "X"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = format!("/api/v1/customers/{}", uuid::Uuid::new_v4());
    let (status, _) = send(&app.router, authed("GET", &missing, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let path = format!("/api/v1/customers/{}", customer["id"].as_str().unwrap());
    let (status, _) = send(&app.router, authed("DELETE", &path, None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app.router, authed("GET", &path, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_json_bodies_are_bad_requests() {
    let app = app();

    let (status, body) = send(
        &app.router,
        authed(
            "POST",
            "/api/v1/payment-intents",
            Some(json!({"amount": 1000, "currency": "usd"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("customer_id"));

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/customers")
        .header("authorization", format!("Bearer {}", AUTH_TOKEN))
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());

    assert!(app.provider.intents.lock().unwrap().is_empty());
    assert!(app.store.list_customers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_intent_status_rejects_encoded_paths() {
    let app = app();
    let uri = "/api/v1/payment-intents/..%2F..%2Fv1%2Fcustomers/status";

    let (status, body) = send(&app.router, authed("GET", uri, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_provider_failure_is_bad_gateway() {
    let app = app();
    app.provider
        .fail
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let (status, _) = send(
        &app.router,
        authed(
            "POST",
            "/api/v1/customers",
            Some(json!({"email": "x@example.com", "name": "X"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(app.store.list_customers().await.unwrap().is_empty());
}
