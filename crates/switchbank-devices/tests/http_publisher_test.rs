//! HTTP Publisher Tests
//!
//! Runs the reqwest transport against a loopback axum server.
#![cfg(feature = "http")]

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use switchbank_core::DataTree;
use switchbank_devices::{
    build_digest, normalize, HttpTransport, MetadataPublisher, PublishMethod, PublishOutcome,
    PublisherConfig,
};

#[derive(Clone, Default)]
struct Received {
    bodies: Arc<Mutex<Vec<Value>>>,
    status: Arc<Mutex<u16>>,
}

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["username"] == "admin" && body["password"] == "secret" {
        (StatusCode::OK, Json(json!({"token": "abc"})))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"message": "bad credentials"})))
    }
}

async fn metadata(
    State(received): State<Received>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer abc") {
        return StatusCode::UNAUTHORIZED;
    }
    received.bodies.lock().unwrap().push(body);
    StatusCode::from_u16(*received.status.lock().unwrap()).unwrap()
}

async fn serve(received: Received) -> String {
    let app = Router::new()
        .route("/signalk/v1/auth/login", post(login))
        .route("/plugins/metadata", put(metadata))
        .with_state(received);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn config(server: String, credentials: &str) -> PublisherConfig {
    PublisherConfig {
        endpoint: Some("/plugins/metadata".into()),
        method: Some(PublishMethod::Put),
        credentials: Some(credentials.into()),
        server,
        retries: 2,
        interval: 20,
        ..PublisherConfig::default()
    }
}

fn digest() -> switchbank_devices::MetadataDigest {
    let normalized = normalize(&json!({
        "root": "a.",
        "switchbanks": [{"instance": 3, "channels": [{"index": 2, "description": "Deck light"}]}]
    }))
    .unwrap();
    build_digest(&normalized.configuration)
}

#[tokio::test]
async fn test_http_publish_delivers_digest() {
    let received = Received::default();
    *received.status.lock().unwrap() = 200;
    let server = serve(received.clone()).await;

    let tree = DataTree::new();
    let publisher = MetadataPublisher::remote(
        tree.clone(),
        config(server, "admin:secret"),
        Arc::new(HttpTransport::new()),
    );
    let outcome = publisher.publish(&digest()).await;

    assert!(matches!(outcome, PublishOutcome::Remote { attempts: 1, .. }));
    let bodies = received.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["a.3.2.state"]["displayName"], "Deck light");
    assert_eq!(bodies[0]["a.3"]["instance"], 3);
    assert!(tree.metas().is_empty());
}

#[tokio::test]
async fn test_http_publish_rejected_falls_back() {
    let received = Received::default();
    *received.status.lock().unwrap() = 500;
    let server = serve(received.clone()).await;

    let tree = DataTree::new();
    let publisher = MetadataPublisher::remote(
        tree.clone(),
        config(server, "admin:secret"),
        Arc::new(HttpTransport::new()),
    );
    let outcome = publisher.publish(&digest()).await;

    assert!(matches!(outcome, PublishOutcome::FallbackLocal { .. }));
    assert_eq!(received.bodies.lock().unwrap().len(), 2);
    assert_eq!(tree.metas().len(), 2);
}

#[tokio::test]
async fn test_http_login_failure_falls_back() {
    let received = Received::default();
    let server = serve(received.clone()).await;

    let tree = DataTree::new();
    let publisher = MetadataPublisher::remote(
        tree.clone(),
        config(server, "admin:wrong"),
        Arc::new(HttpTransport::new()),
    );
    let outcome = publisher.publish(&digest()).await;

    match outcome {
        PublishOutcome::FallbackLocal { reason, .. } => assert!(reason.contains("authentication")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(received.bodies.lock().unwrap().is_empty());
}
