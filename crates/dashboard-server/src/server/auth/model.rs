use crate::server::error::AppError;
use serde::{Deserialize, Serialize};

/// A user as exposed over the API. The password hash never leaves the repo.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id_user: i64,
    pub name: String,
    pub email: String,
    pub date_added: String,
    pub date_updated: String,
}

/// A user row including its password hash, only used to check credentials.
#[derive(Debug, sqlx::FromRow)]
pub struct UserCredentials {
    #[sqlx(flatten)]
    pub user: User,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl Registration {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() || self.password.is_empty()
        {
            return Err(AppError::Validation(
                "name, email and password are required".to_owned(),
            ));
        }
        require_email(&self.email)
    }
}

#[derive(Debug, Deserialize)]
pub struct Login {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl Login {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(AppError::Validation(
                "email and password are required".to_owned(),
            ));
        }
        Ok(())
    }
}

fn require_email(email: &str) -> Result<(), AppError> {
    match email.trim().split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AppError::Validation("email is not a valid address".to_owned())),
    }
}

/// Returned by register and login.
#[derive(Debug, Serialize)]
pub struct Session {
    pub user: User,
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: String,
}
