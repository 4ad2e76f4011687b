//! HTTP API integration tests
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`. Live
//! WebSocket connections are stood in for by registering channels directly
//! with the connection manager.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use vcode_broker::broker::{AdmissionBroker, ConnectionId, ManualClock};
use vcode_broker::config::Settings;
use vcode_broker::server::{create_app, AppState};
use vcode_broker::websocket::ServerMessage;

struct TestClient {
    id: ConnectionId,
    rx: mpsc::Receiver<ServerMessage>,
}

fn setup() -> (AppState, Router) {
    let state = AppState::new(Settings::default());
    let app = create_app(state.clone());
    (state, app)
}

fn connect(state: &AppState) -> TestClient {
    connect_with_capacity(state, 16)
}

fn connect_with_capacity(state: &AppState, capacity: usize) -> TestClient {
    let (tx, rx) = mpsc::channel(capacity);
    let handle = state.connection_manager.register(tx).unwrap();
    TestClient { id: handle.id, rx }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn post(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn get(app: &Router, path: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(path).body(Body::empty()).unwrap();
    send(app, request).await
}

fn pairing(vcode: &str, client: &TestClient) -> Value {
    json!({ "vCode": vcode, "connectionId": client.id.to_string() })
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_state, app) = setup();

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["sessions"]["pending"], 0);
}

#[tokio::test]
async fn test_sender_then_receiver_join() {
    let (state, app) = setup();
    let mut sender = connect(&state);
    let mut receiver = connect(&state);

    let (status, body) = post(&app, "/api/sender_join", pairing("ABC123", &sender)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "vCode received for sender_join");
    assert_eq!(body["session"]["vCode"], "ABC123");
    assert_eq!(body["session"]["state"], "pending");
    assert!(matches!(
        sender.rx.recv().await,
        Some(ServerMessage::Registered { .. })
    ));

    let (status, body) = post(&app, "/api/receiver_join", pairing("ABC123", &receiver)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "vCode exists, receiver can join");
    assert_eq!(body["session"]["state"], "paired");

    assert!(matches!(
        sender.rx.recv().await,
        Some(ServerMessage::Paired { .. })
    ));
    assert!(matches!(
        receiver.rx.recv().await,
        Some(ServerMessage::Paired { .. })
    ));

    let (status, body) = get(&app, "/api/sessions/ABC123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "paired");
}

#[tokio::test]
async fn test_duplicate_sender_join() {
    let (state, app) = setup();
    let first = connect(&state);
    let second = connect(&state);

    post(&app, "/api/sender_join", pairing("ABC123", &first)).await;
    let (status, body) = post(&app, "/api/sender_join", pairing("ABC123", &second)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ALREADY_EXISTS");
    assert_eq!(body["error"], "vCode already exists");
}

#[tokio::test]
async fn test_receiver_join_unknown_code() {
    let (state, app) = setup();
    let receiver = connect(&state);

    let (status, body) = post(&app, "/api/receiver_join", pairing("nope", &receiver)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "NO_SUCH_CODE");
    assert_eq!(body["error"], "vCode does not exist");
}

#[tokio::test]
async fn test_second_receiver_join() {
    let (state, app) = setup();
    let sender = connect(&state);
    let first = connect(&state);
    let second = connect(&state);

    post(&app, "/api/sender_join", pairing("ABC123", &sender)).await;
    post(&app, "/api/receiver_join", pairing("ABC123", &first)).await;
    let (status, body) = post(&app, "/api/receiver_join", pairing("ABC123", &second)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ALREADY_PAIRED");
}

#[tokio::test]
async fn test_malformed_requests_are_invalid_input() {
    let (state, app) = setup();
    let client = connect(&state);

    let cases = [
        json!({ "connectionId": client.id.to_string() }),
        json!({ "vCode": "ABC123" }),
        json!({ "vCode": "", "connectionId": client.id.to_string() }),
        json!({ "vCode": "has space", "connectionId": client.id.to_string() }),
        json!({ "vCode": "ABC123", "connectionId": "not-a-uuid" }),
        json!({ "vCode": 42, "connectionId": client.id.to_string() }),
    ];

    for body in cases {
        let (status, response) = post(&app, "/api/sender_join", body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(response["code"], "INVALID_INPUT", "body: {body}");
    }

    let request = Request::builder()
        .method("POST")
        .uri("/api/sender_join")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, response) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_unknown_connection_rejected() {
    let (_state, app) = setup();
    let body = json!({ "vCode": "ABC123", "connectionId": ConnectionId::new().to_string() });

    let (status, response) = post(&app, "/api/sender_join", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "UNKNOWN_CONNECTION");
}

#[tokio::test]
async fn test_release_notifies_peer_and_frees_code() {
    let (state, app) = setup();
    let sender = connect(&state);
    let mut receiver = connect(&state);

    post(&app, "/api/sender_join", pairing("ABC123", &sender)).await;
    post(&app, "/api/receiver_join", pairing("ABC123", &receiver)).await;
    let _ = receiver.rx.recv().await;

    let (status, body) = post(&app, "/api/release", pairing("ABC123", &sender)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["state"], "closed");

    assert!(matches!(
        receiver.rx.recv().await,
        Some(ServerMessage::SessionClosed { .. })
    ));

    let (status, body) = get(&app, "/api/sessions/ABC123").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_receiver_join_with_backlogged_sender() {
    let (state, app) = setup();
    // The registered push fills the sender's only slot and is never read
    let sender = connect_with_capacity(&state, 1);
    let mut receiver = connect(&state);

    let (status, _) = post(&app, "/api/sender_join", pairing("ABC123", &sender)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(&app, "/api/receiver_join", pairing("ABC123", &receiver)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["state"], "paired");
    assert!(matches!(
        receiver.rx.recv().await,
        Some(ServerMessage::Paired { .. })
    ));

    let (status, body) = post(&app, "/api/release", pairing("ABC123", &receiver)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["state"], "closed");
    drop(sender);
}

#[tokio::test]
async fn test_expired_pending_session_is_not_found() {
    let settings = Settings::default();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let broker = AdmissionBroker::with_clock(&settings.broker, clock.clone());
    let ttl = settings.broker.pending_ttl_seconds;
    let state = AppState::with_broker(settings, broker);
    let app = create_app(state.clone());
    let mut sender = connect(&state);

    let (status, body) = post(&app, "/api/sender_join", pairing("ABC123", &sender)).await;
    assert_eq!(status, StatusCode::OK);
    match sender.rx.recv().await {
        Some(ServerMessage::Registered { expires_at, .. }) => assert!(expires_at.is_some()),
        other => panic!("expected registered, got {other:?}"),
    }

    clock.advance(Duration::from_secs(ttl + 1));

    // Not swept yet, but no longer joinable
    let (status, body2) = get(&app, "/api/sessions/ABC123").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body2["code"], "NOT_FOUND");
    assert_eq!(body["session"]["state"], "pending");
}

#[tokio::test]
async fn test_release_by_outsider() {
    let (state, app) = setup();
    let sender = connect(&state);
    let outsider = connect(&state);

    post(&app, "/api/sender_join", pairing("ABC123", &sender)).await;
    let (status, body) = post(&app, "/api/release", pairing("ABC123", &outsider)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "NOT_BOUND");
}

#[tokio::test]
async fn test_suggest_code_is_free() {
    let (_state, app) = setup();

    let (status, body) = get(&app, "/api/codes/suggest").await;
    assert_eq!(status, StatusCode::OK);
    let vcode = body["vCode"].as_str().unwrap();
    assert!(!vcode.is_empty());

    let (status, _) = get(&app, &format!("/api/sessions/{vcode}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_reports_sessions() {
    let (state, app) = setup();
    let sender = connect(&state);
    post(&app, "/api/sender_join", pairing("ABC123", &sender)).await;

    let (status, body) = get(&app, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessions"]["pending_sessions"], 1);
    assert_eq!(body["sessions"]["bound_connections"], 1);
    assert_eq!(body["connections"]["total_connections"], 1);
    assert_eq!(body["pending_ttl_seconds"], 300);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (_state, app) = setup();
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("vcode_sessions_active"));
}
