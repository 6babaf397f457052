use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};

use crate::model::AdjustmentHistory;
use crate::scheduler::{Scheduler, Status};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/status", get(status))
        .route("/adjustments", get(adjustments))
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(state.scheduler.status().await)
}

/// Persisted history when readable, otherwise the controller's memory copy.
async fn adjustments(State(state): State<AppState>) -> Json<AdjustmentHistory> {
    let ctl = state.scheduler.controller();
    match ctl.store().load_adjustment_history().await {
        Ok(h) => Json(h),
        Err(e) => {
            tracing::warn!(target: "store", "serving in-memory adjustment history: {e:#}");
            Json(ctl.history().await)
        }
    }
}
