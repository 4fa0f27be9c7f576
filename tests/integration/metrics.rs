//! Metrics counters and the latency window, observed through real actors.

use std::sync::Arc;

use uuid::Uuid;

use crate::common::*;
use xfscene::backend::session::actor::SessionActor;
use xfscene::backend::session::state::SessionState;
use xfscene::backend::Metrics;

#[tokio::test]
async fn test_fanout_latency_window_fills() {
    let metrics = Metrics::new();
    let handle = SessionActor::spawn(
        SessionState::new("s1"),
        None,
        metrics.clone(),
        Arc::new(xfscene::backend::server::config::ServerConfig::default()),
    );
    let c1 = join(&handle, "u1").await;
    let c2 = join(&handle, "u2").await;
    let _ = c1.next_event().await;

    let object_id = Uuid::new_v4();
    mutate(&handle, &c1, 1000, create_cube(object_id, "o")).await;
    for i in 0..9u64 {
        mutate(&handle, &c1, 2000 + i, rename(object_id, &format!("n{i}"))).await;
    }
    // Drain to prove all ten fan-outs happened.
    for _ in 0..10 {
        let _ = c2.next_event().await;
    }

    let snapshot = metrics.snapshot();
    // Joins fan out too, so at least the ten mutations are sampled.
    assert!(snapshot.latency_us.samples >= 10);
    assert!(snapshot.latency_us.p50 <= snapshot.latency_us.p95);
    assert!(snapshot.latency_us.p95 <= snapshot.latency_us.p99);
}

#[tokio::test]
async fn test_registry_tracks_active_sessions_gauge() {
    let dir = tempfile::tempdir().unwrap();
    let metrics = Metrics::new();
    let registry = xfscene::backend::session::registry::SessionRegistry::new(
        Arc::new(test_config(dir.path())),
        metrics.clone(),
    );

    registry.join_or_create("a").unwrap();
    registry.join_or_create("b").unwrap();
    registry.join_or_create("a").unwrap(); // lookup, not a new session
    assert_eq!(metrics.snapshot().active_sessions, 2);

    registry.shutdown_all().await;
    assert_eq!(metrics.snapshot().active_sessions, 0);
}

#[tokio::test]
async fn test_metrics_endpoint_serializes_snapshot() {
    use axum::extract::State;

    let metrics = Metrics::new();
    metrics.message_in();
    metrics.transform_update();

    let response = xfscene::backend::metrics::metrics_handler(State(metrics)).await;
    let value = serde_json::to_value(&response.0).unwrap();
    assert_eq!(value["messages_in_total"], 1);
    assert_eq!(value["transform_updates_total"], 1);
    assert!(value["latency_us"]["p50"].is_u64());
}
