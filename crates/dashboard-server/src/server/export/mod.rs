//! Spreadsheet export endpoints.

mod download;
mod handler;
mod query;

use super::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

/// Routes mounted under `/v1/export`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(handler::users))
        .route("/products", get(handler::products))
        .route("/categories", get(handler::categories))
        .route("/custom", post(handler::custom))
        .route("/report", post(query::report))
        .route("/query", post(query::query))
        .route("/buffer", post(handler::buffer))
}
