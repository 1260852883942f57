pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod export;
pub mod health;
pub mod products;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod transaction;

#[cfg(test)]
mod tests;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::get,
};
use state::AppState;
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
};

/// Builds the full application router.
///
/// Product routes run under the transaction middleware; everything else is
/// transaction-free. Uploaded images are served from `/image`. Layers,
/// outermost first: CORS, request tracing, panic recovery, error detail
/// rendering, body limit.
pub fn router(state: AppState) -> Router {
    let products = products::routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        transaction::transaction_manager,
    ));
    let api = Router::new()
        .nest("/v1/auth", auth::routes())
        .nest("/v1/products", products)
        .nest("/v1/export", export::routes());

    let prefix = state.config.api_prefix.as_str();
    let app = Router::new()
        .route("/health", get(health::health))
        .nest_service("/image", ServeDir::new(&state.config.image_dir));
    let app = if prefix == "/" {
        app.merge(api)
    } else {
        app.nest(prefix, api)
    };

    app.fallback(error::route_not_found)
        .layer(DefaultBodyLimit::max(state.config.body_limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            error::render_error_detail,
        ))
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
