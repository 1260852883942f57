//! User queries. Each takes any SQLite executor, so the same query runs on
//! the pool or inside a request's transaction.

use super::model::{User, UserCredentials};
use sqlx::SqliteExecutor;

const COLUMNS: &str = "id_user, name, email, date_added, date_updated";

pub async fn find<'e>(db: impl SqliteExecutor<'e>, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id_user = ?"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn find_credentials<'e>(
    db: impl SqliteExecutor<'e>,
    email: &str,
) -> Result<Option<UserCredentials>, sqlx::Error> {
    sqlx::query_as::<_, UserCredentials>(&format!(
        "SELECT {COLUMNS}, password FROM users WHERE email = ?"
    ))
    .bind(email.trim())
    .fetch_optional(db)
    .await
}

pub async fn email_taken<'e>(
    db: impl SqliteExecutor<'e>,
    email: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE email = ?)")
        .bind(email.trim())
        .fetch_one(db)
        .await
}

pub async fn insert<'e>(
    db: impl SqliteExecutor<'e>,
    name: &str,
    email: &str,
    password_hash: &str,
) -> Result<User, sqlx::Error> {
    let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (name, email, password, date_added, date_updated) \
         VALUES (?, ?, ?, ?, ?) RETURNING {COLUMNS}"
    ))
    .bind(name.trim())
    .bind(email.trim())
    .bind(password_hash)
    .bind(now.as_str())
    .bind(now.as_str())
    .fetch_one(db)
    .await
}

/// One page of users ordered by id.
pub async fn page<'e>(
    db: impl SqliteExecutor<'e>,
    offset: usize,
    limit: usize,
) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {COLUMNS} FROM users ORDER BY id_user LIMIT ? OFFSET ?"
    ))
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(db)
    .await
}
