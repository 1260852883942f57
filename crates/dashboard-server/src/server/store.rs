use super::error::AppError;
use dashboard_core::{BoxError, Record, txn::Datastore};
use serde_json::Value;
use sqlx::{
    Column as _, Row as _, Sqlite, SqlitePool, Transaction, TypeInfo as _, ValueRef as _,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use std::{future::Future, str::FromStr};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

const SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS product (
    id_product    INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT    NOT NULL,
    category_name TEXT    NOT NULL,
    price         REAL    NOT NULL CHECK (price >= 0),
    foto          TEXT,
    date_added    TEXT    NOT NULL,
    date_updated  TEXT    NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS users (
    id_user       INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT    NOT NULL,
    email         TEXT    NOT NULL UNIQUE COLLATE NOCASE,
    password      TEXT    NOT NULL,
    date_added    TEXT    NOT NULL,
    date_updated  TEXT    NOT NULL
)
"#,
];

/// Borrowed access to an open transaction's connection.
pub type TxConn<'a> = MappedMutexGuard<'a, Transaction<'static, Sqlite>>;

/// SQLite-backed datastore.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

/// An open transaction shared between the request's scope and its handlers.
///
/// Handlers borrow the connection through [`StoreTx::conn`]; commit and
/// rollback take the transaction out, after which `conn` fails.
#[derive(Debug)]
pub struct StoreTx {
    inner: Mutex<Option<Transaction<'static, Sqlite>>>,
}

impl StoreTx {
    pub async fn conn(&self) -> Result<TxConn<'_>, AppError> {
        MutexGuard::try_map(self.inner.lock().await, |slot| slot.as_mut())
            .map_err(|_| AppError::TransactionClosed)
    }

    async fn take(&self) -> Result<Transaction<'static, Sqlite>, BoxError> {
        self.inner
            .lock()
            .await
            .take()
            .ok_or_else(|| "transaction already finished".into())
    }
}

impl Store {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// A private in-memory database on a single, never-recycled connection.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Converts a row of any shape into a record keyed by column name.
///
/// Values keep their storage class: integers and reals become numbers, text
/// stays text, blobs are summarized by size.
pub fn row_to_record(row: &SqliteRow) -> Result<Record, sqlx::Error> {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => Value::from(row.try_get::<i64, _>(index)?),
                "REAL" => Value::from(row.try_get::<f64, _>(index)?),
                "BLOB" => {
                    let blob = row.try_get::<Vec<u8>, _>(index)?;
                    Value::String(format!("<{} bytes>", blob.len()))
                }
                _ => Value::String(row.try_get::<String, _>(index)?),
            }
        };
        record.insert(column.name().to_owned(), value);
    }
    Ok(record)
}

impl Datastore for Store {
    type Handle = StoreTx;

    fn begin(&self) -> impl Future<Output = Result<StoreTx, BoxError>> + Send {
        let pool = self.pool.clone();
        async move {
            let tx = pool.begin().await?;
            Ok(StoreTx {
                inner: Mutex::new(Some(tx)),
            })
        }
    }

    fn commit(&self, handle: &StoreTx) -> impl Future<Output = Result<(), BoxError>> + Send {
        async move {
            handle.take().await?.commit().await?;
            Ok(())
        }
    }

    fn rollback(&self, handle: &StoreTx) -> impl Future<Output = Result<(), BoxError>> + Send {
        async move {
            handle.take().await?.rollback().await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn rows_of_any_shape_become_records() {
        let store = Store::in_memory().await.expect("in-memory database");
        let row = sqlx::query("SELECT 7 AS n, 2.5 AS r, 'x' AS t, NULL AS z, x'0102' AS b")
            .fetch_one(store.pool())
            .await
            .expect("row");

        let record = row_to_record(&row).expect("record");

        assert_eq!(
            Value::Object(record),
            json!({ "n": 7, "r": 2.5, "t": "x", "z": null, "b": "<2 bytes>" })
        );
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let store = Store::in_memory().await.expect("in-memory database");
        store.migrate().await.expect("first run");
        store.migrate().await.expect("second run");

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('product', 'users') \
             ORDER BY name",
        )
        .fetch_all(store.pool())
        .await
        .expect("tables");
        assert_eq!(tables, ["product", "users"]);
    }
}
