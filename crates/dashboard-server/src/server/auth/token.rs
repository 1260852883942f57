//! HS256 access tokens.

use super::model::User;
use crate::server::error::AppError;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// `id_user` of the token's owner.
    pub id: i64,
    pub email: String,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn issue(user: &User, secret: &str, ttl_hours: u32) -> Result<String, AppError> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        id: user.id_user,
        email: user.email.clone(),
        name: user.name.clone(),
        iat: now,
        exp: now + i64::from(ttl_hours) * 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| AppError::Internal(format!("token signing failed: {err}")))
}

pub fn verify(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|err| match err.kind() {
        ErrorKind::ExpiredSignature => {
            AppError::Unauthorized("Token has expired. Please log in again")
        }
        _ => AppError::Unauthorized("Invalid token"),
    })
}
