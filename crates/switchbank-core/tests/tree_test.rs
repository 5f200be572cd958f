//! Data Tree Integration Tests
//!
//! Tests the in-process data tree as a plugin sees it:
//! - Put routing and handler ownership
//! - Outbound emission and status mirroring on the bus
//! - Metadata commit events

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use switchbank_core::{DataTree, PutHandler, PutResponse, Severity, TreeEvent};

#[tokio::test]
async fn test_put_handler_emits_outbound() {
    let tree = DataTree::new();
    let mut outbound = tree.bus().filter().outbound_events();

    let emitter = tree.clone();
    let handler = move |_ctx: &str, path: &str, value: &Value| {
        emitter.emit("nmea2000out", format!("{}={}", path, value), "switchbank");
        PutResponse::completed()
    };
    tree.register_put_handler("vessels.self", "bank.1.1.state", Arc::new(handler), "switchbank")
        .unwrap();

    let response = tree.put("vessels.self", "bank.1.1.state", &json!(1));
    assert!(response.is_success());

    let (event, meta) = outbound.recv().await.unwrap();
    assert_eq!(meta.source, "switchbank");
    match event {
        TreeEvent::Outbound { channel, payload, .. } => {
            assert_eq!(channel, "nmea2000out");
            assert_eq!(payload, "bank.1.1.state=1");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_put_in_other_context_is_unhandled() {
    let tree = DataTree::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let handler: Arc<dyn PutHandler> = Arc::new(move |_: &str, _: &str, _: &Value| {
        counter.fetch_add(1, Ordering::SeqCst);
        PutResponse::completed()
    });
    tree.register_put_handler("vessels.self", "bank.1.1.state", handler, "switchbank")
        .unwrap();

    let response = tree.put("vessels.other", "bank.1.1.state", &json!(1));
    assert_eq!(response.status_code, 405);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_status_reports_reach_bus() {
    let tree = DataTree::new();
    let mut statuses = tree.bus().filter().status_events();

    tree.status().warning("channel dropped");

    let (event, _) = statuses.recv().await.unwrap();
    match event {
        TreeEvent::Status { severity, message, .. } => {
            assert_eq!(severity, Severity::Warning);
            assert_eq!(message, "channel dropped");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(tree.status().contains("channel dropped"));
}

#[tokio::test]
async fn test_commit_metas_publishes_meta_events() {
    let tree = DataTree::new();
    let mut metas = tree.bus().filter().meta_events();

    tree.commit_metas(
        vec![("bank.2".to_string(), json!({"instance": 2}))],
        "switchbank",
    );

    let (event, _) = metas.recv().await.unwrap();
    assert_eq!(event.path(), Some("bank.2"));
    assert_eq!(tree.meta("bank.2"), Some(json!({"instance": 2})));
}
