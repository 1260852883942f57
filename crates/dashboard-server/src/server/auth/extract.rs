use super::{model::User, repo, token};
use crate::server::{
    error::AppError, state::AppState, store::StoreTx, transaction::RequestTransaction,
};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;

/// The authenticated caller.
///
/// Requires an `Authorization: Bearer <token>` header whose token verifies
/// and whose user still exists. Inside a transactional request the user is
/// looked up through the request's transaction.
#[derive(Clone, Debug)]
pub struct AuthUser(pub User);

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::Unauthorized("Missing bearer token"))?;
    match value.strip_prefix("Bearer ").map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(AppError::Unauthorized("Missing bearer token")),
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let bearer = bearer_token(&parts.headers)?;
        let claims = token::verify(bearer, state.config.jwt_secret.expose())?;

        let txn = parts
            .extensions
            .get::<RequestTransaction<StoreTx>>()
            .map(|txn| Arc::clone(&txn.0));
        let user = match txn {
            Some(tx) => {
                let mut conn = tx.conn().await?;
                repo::find(&mut **conn, claims.id).await?
            }
            None => repo::find(state.store.pool(), claims.id).await?,
        };

        user.map(Self)
            .ok_or(AppError::Unauthorized("User no longer exists"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn bearer_token_is_read_from_the_header() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")).ok(), Some("abc.def"));
        assert!(bearer_token(&headers("Bearer ")).is_err());
        assert!(bearer_token(&headers("Basic dXNlcg==")).is_err());
        assert!(bearer_token(&HeaderMap::new()).is_err());
    }
}
