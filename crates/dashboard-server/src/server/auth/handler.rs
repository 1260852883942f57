use super::{
    extract::AuthUser,
    model::{Login, Registration, Session, User},
    password, repo, token,
};
use crate::server::{
    api::{ApiJson, ApiResponse},
    error::AppError,
    state::AppState,
};
use axum::{Json, extract::State, http::StatusCode};
use dashboard_core::txn::execute_in_transaction;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

fn session(state: &AppState, user: User) -> Result<Session, AppError> {
    let hours = state.config.jwt_expires_in_hours;
    let token = token::issue(&user, state.config.jwt_secret.expose(), hours)?;
    Ok(Session {
        user,
        token,
        token_type: "Bearer",
        expires_in: format!("{hours}h"),
    })
}

/// Creates an account and signs it in.
pub async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Registration>,
) -> Result<(StatusCode, Json<ApiResponse<Session>>), AppError> {
    body.validate()?;
    let hash = password::hash_blocking(body.password).await?;

    let user = execute_in_transaction(&state.store, None, move |tx| async move {
        let mut conn = tx.conn().await?;
        if repo::email_taken(&mut **conn, &body.email).await? {
            return Err(AppError::Conflict("Email is already registered".to_owned()));
        }
        Ok(repo::insert(&mut **conn, &body.name, &body.email, &hash).await?)
    })
    .await?;

    tracing::info!(id = user.id_user, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new("Registration successful", session(&state, user)?)),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Login>,
) -> Result<Json<ApiResponse<Session>>, AppError> {
    body.validate()?;
    let Some(found) = repo::find_credentials(state.store.pool(), &body.email).await? else {
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS));
    };
    if !password::verify_blocking(body.password, found.password).await? {
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS));
    }

    tracing::info!(id = found.user.id_user, "User logged in");
    Ok(Json(ApiResponse::new(
        "Login successful",
        session(&state, found.user)?,
    )))
}

/// Tokens are stateless; the client discards its copy.
pub async fn logout(AuthUser(user): AuthUser) -> Json<ApiResponse<()>> {
    tracing::info!(id = user.id_user, "User logged out");
    Json(ApiResponse::message("Logout successful"))
}

pub async fn profile(AuthUser(user): AuthUser) -> Json<ApiResponse<User>> {
    Json(ApiResponse::new("User profile", user))
}
