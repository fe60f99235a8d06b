// Integration tests for the publish and status HTTP surfaces.
//
// The broker link is replaced with a recording CommandSink so connectivity can
// be flipped without a broker.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use beacon::api::create_router;
use beacon::bridge::BridgeServer;
use beacon::broker::{CommandSink, PublishError, PublishOptions};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

// ── Test sink ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MockSink {
    connected: AtomicBool,
    fail_with: Mutex<Option<PublishError>>,
    published: Mutex<Vec<(String, String)>>,
}

impl CommandSink for MockSink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&self, topic: &str, payload: &str, _options: PublishOptions) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::NotConnected);
        }
        if let Some(err) = self.fail_with.lock().unwrap().clone() {
            return Err(err);
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

fn create_test_app(connected: bool) -> (Router, Arc<MockSink>, Arc<BridgeServer>) {
    let sink = Arc::new(MockSink::default());
    sink.connected.store(connected, Ordering::SeqCst);
    let bridge = Arc::new(BridgeServer::new(sink.clone(), 8));
    (create_router(bridge.clone(), "/api/mqtt-ws"), sink, bridge)
}

async fn post_publish(app: Router, body: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/mqtt/publish")
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get_status(app: Router) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/mqtt/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ── Publish ──────────────────────────────────────────────────────────────────

/// Connected broker → 200 and exactly one publish with identical topic/payload
#[tokio::test]
async fn test_publish_relays_command() {
    let (app, sink, _) = create_test_app(true);

    let (status, body) = post_publish(
        app,
        r#"{"topic":"m2ccm/noa/g22315333/command/led","message":"on"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let published = sink.published.lock().unwrap();
    assert_eq!(
        *published,
        vec![(
            "m2ccm/noa/g22315333/command/led".to_string(),
            "on".to_string()
        )]
    );
}

/// Broker down → 503 "broker not connected", nothing published
#[tokio::test]
async fn test_publish_while_disconnected_returns_503() {
    let (app, sink, _) = create_test_app(false);

    let (status, body) = post_publish(
        app,
        r#"{"topic":"m2ccm/noa/g22315333/command/led","message":"on"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "broker not connected");
    assert!(sink.published.lock().unwrap().is_empty());
}

/// Missing or empty fields → 400, checked before connectivity
#[tokio::test]
async fn test_publish_missing_fields_returns_400() {
    for payload in [
        r#"{"topic":"m2ccm/noa/g22315333/command/led"}"#,
        r#"{"message":"on"}"#,
        r#"{"topic":"","message":"on"}"#,
    ] {
        let (app, _, _) = create_test_app(false);
        let (status, body) = post_publish(app, payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {}", payload);
        assert_eq!(body["error"], "topic and message are required");
    }
}

#[tokio::test]
async fn test_publish_invalid_json_returns_400() {
    let (app, _, _) = create_test_app(true);
    let (status, body) = post_publish(app, "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

/// Link up but request not queued → 500 without leaking the reason
#[tokio::test]
async fn test_publish_internal_error_returns_500() {
    let (app, sink, _) = create_test_app(true);
    *sink.fail_with.lock().unwrap() = Some(PublishError::Rejected("request channel full".to_string()));

    let (status, body) = post_publish(
        app,
        r#"{"topic":"m2ccm/noa/g22315333/command/led","message":"off"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal server error");
}

// ── Status ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_status_reports_link_and_viewers() {
    let (app, _, bridge) = create_test_app(true);
    let (_a, _rx_a) = bridge.on_viewer_connect();
    let (_b, _rx_b) = bridge.on_viewer_connect();

    let (status, body) = get_status(app).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"success": true, "data": {"brokerConnected": true, "connectedViewerCount": 2}})
    );
}

#[tokio::test]
async fn test_status_follows_broker_link() {
    let (app, sink, _) = create_test_app(true);
    sink.connected.store(false, Ordering::SeqCst);

    let (_, body) = get_status(app).await;
    assert_eq!(body["data"]["brokerConnected"], false);
    assert_eq!(body["data"]["connectedViewerCount"], 0);
}
