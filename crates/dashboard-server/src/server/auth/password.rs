//! Argon2id password hashing.
//!
//! Hashes are stored in PHC string form, so the parameters travel with the
//! hash and verification never needs them separately.

use crate::server::error::AppError;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

#[cfg(not(test))]
fn hasher() -> Argon2<'static> {
    Argon2::default()
}

/// Minimal cost for test builds.
#[cfg(test)]
fn hasher() -> Argon2<'static> {
    let params = argon2::Params::new(1024, 1, 1, None).unwrap_or_default();
    Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params)
}

pub fn hash(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::Internal(format!("password hashing failed: {err}")))
}

/// `false` for a wrong password and for a stored value that is not a hash.
pub fn verify(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored).is_ok_and(|parsed| {
        hasher()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Runs [`hash`] off the async workers.
pub async fn hash_blocking(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash(&password))
        .await
        .map_err(|err| AppError::Internal(format!("password hashing task failed: {err}")))?
}

/// Runs [`verify`] off the async workers.
pub async fn verify_blocking(password: String, stored: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify(&password, &stored))
        .await
        .map_err(|err| AppError::Internal(format!("password check task failed: {err}")))
}
