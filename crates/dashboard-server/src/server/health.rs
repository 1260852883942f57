use super::state::AppState;
use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::sync::atomic::Ordering;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "Server is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "exports_inflight": state.exports_inflight.load(Ordering::Relaxed),
    }))
}
