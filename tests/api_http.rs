// tests/api_http.rs
//
// HTTP-level tests for the status Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /status
// - GET /adjustments (including the in-memory fallback)

mod common;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use std::sync::Arc;
use tower::ServiceExt as _; // for `oneshot`

use adaptive_poller::api::{self, AppState};
use adaptive_poller::model::{Source, SourceStats, TurnoverStats};
use adaptive_poller::store::{MemoryStore, Persistence};
use adaptive_poller::{build_scheduler, Scheduler};

const BODY_LIMIT: usize = 1024 * 1024;

async fn scheduler_with(store: Arc<dyn Persistence>) -> Arc<Scheduler> {
    let cfg = common::test_config(60);
    Arc::new(
        build_scheduler(
            &cfg,
            Arc::new(common::ChurnFetcher::default()),
            Arc::new(common::CountingCycle::default()),
            store,
        )
        .await,
    )
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    (status, serde_json::from_slice(&bytes).unwrap_or(Json::Null))
}

#[tokio::test]
async fn health_returns_ok() {
    let app = api::router(AppState {
        scheduler: scheduler_with(Arc::new(MemoryStore::new())).await,
    });
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");
    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), "OK");
}

#[tokio::test]
async fn status_reports_controller_state() {
    let sched = scheduler_with(Arc::new(MemoryStore::new())).await;
    let app = api::router(AppState {
        scheduler: sched.clone(),
    });

    let (code, v) = get_json(app, "/status").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(v["running"], serde_json::json!(false));
    assert_eq!(v["current_interval_minutes"], serde_json::json!(60));
    assert_eq!(v["min_interval_minutes"], serde_json::json!(5));
    assert_eq!(v["adjustment_threshold"], serde_json::json!(5));
    assert_eq!(v["poll_count"], serde_json::json!(0));
    assert!(v["last_adjustment_at"].is_null());
    assert!(v["recent_polls"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn adjustments_fall_back_to_memory_when_store_is_down() {
    let sched = scheduler_with(Arc::new(common::FailingStore)).await;
    let ctl = sched.controller();
    for _ in 0..5 {
        ctl.record_poll().await;
    }
    let mut stats = SourceStats::new();
    stats.insert(
        Source::Gcx,
        TurnoverStats {
            total_items_seen: 4,
            disappeared_count: 3,
            turnover_rate: 0.75,
            avg_lifetime_minutes: 20.0,
            lifetime_samples: 2,
        },
    );
    ctl.adjust(&stats).await;

    let app = api::router(AppState { scheduler: sched });
    let (code, v) = get_json(app, "/adjustments").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(v["stats"]["total_adjustments"], serde_json::json!(1));
    assert_eq!(v["adjustments"][0]["new_interval_minutes"], serde_json::json!(15));
}
