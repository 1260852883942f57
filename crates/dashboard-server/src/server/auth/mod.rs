//! User accounts and bearer-token authentication.

mod extract;
mod handler;
pub mod model;
pub mod password;
pub mod repo;
pub mod token;

pub use extract::AuthUser;

use super::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

/// Routes mounted under `/v1/auth`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(handler::register))
        .route("/login", post(handler::login))
        .route("/logout", post(handler::logout))
        .route("/profile", get(handler::profile))
}
