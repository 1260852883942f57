//! Product catalogue: model, queries, and HTTP handlers.

mod handler;
pub mod model;
pub mod repo;
mod upload;

use super::state::AppState;
use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

/// Routes mounted under `/v1/products`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::list).post(handler::create))
        .route("/statistics", get(handler::statistics))
        .route("/categories", get(handler::categories))
        .route("/search/{term}", get(handler::search))
        .route("/category/{category}", get(handler::by_category))
        .route("/price-range", get(handler::price_range))
        .route("/with-image", post(handler::create_with_image))
        .route("/bulk", post(handler::bulk_create))
        .route("/batch/update", patch(handler::batch_update))
        .route("/batch/delete", delete(handler::batch_delete))
        .route("/transfer/category", patch(handler::transfer_category))
        .route("/{id}/with-image", put(handler::update_with_image))
        .route(
            "/{id}",
            get(handler::get_one)
                .put(handler::update)
                .patch(handler::update)
                .delete(handler::remove),
        )
}
