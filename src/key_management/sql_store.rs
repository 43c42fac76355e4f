//! SQLite key store backed by `sqlx`
//!
//! The `KeyStore` trait is synchronous, so the store owns a small
//! current-thread tokio runtime and blocks on each query. Calling it from
//! inside another tokio runtime panics; async services should wrap calls in
//! `spawn_blocking`.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

use super::record::{KeyRecord, KeyScheme, StoredKey};
use super::store::KeyStore;
use crate::error::{error_codes, CryptoError, CryptoResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS key_records (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    kid        TEXT    NOT NULL UNIQUE,
    scheme     TEXT    NOT NULL,
    material   BLOB    NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
)
"#;

fn db_error(operation: &str, error_code: u32, err: impl std::fmt::Display) -> CryptoError {
    let mut context = HashMap::new();
    context.insert("store".to_string(), "sqlite".to_string());
    CryptoError::StoreError {
        operation: operation.to_string(),
        cause: err.to_string(),
        error_code,
        context,
    }
}

/// Durable key store in a SQLite database
pub struct SqlKeyStore {
    pool: SqlitePool,
    runtime: Runtime,
}

impl SqlKeyStore {
    /// Open (or create) a database file and ensure the schema exists
    pub fn open(path: impl AsRef<Path>) -> CryptoResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        Self::with_options(options)
    }

    /// Connect using a `sqlite:` URL, e.g. `sqlite::memory:`
    pub fn connect(url: &str) -> CryptoResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| db_error("connect", error_codes::KEY_STORAGE_FAILED, e))?
            .create_if_missing(true);
        Self::with_options(options)
    }

    fn with_options(options: SqliteConnectOptions) -> CryptoResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| db_error("connect", error_codes::KEY_STORAGE_FAILED, e))?;

        // A single connection keeps `sqlite::memory:` databases consistent.
        let pool = runtime
            .block_on(
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(Duration::from_secs(5))
                    .connect_with(options),
            )
            .map_err(|e| db_error("connect", error_codes::KEY_STORAGE_FAILED, e))?;

        runtime
            .block_on(sqlx::query(SCHEMA).execute(&pool))
            .map_err(|e| db_error("create_schema", error_codes::KEY_STORAGE_FAILED, e))?;

        log::debug!("Opened sqlite key store");
        Ok(Self { pool, runtime })
    }

    /// Close the connection pool
    pub fn close(self) {
        self.runtime.block_on(self.pool.close());
    }
}

impl KeyStore for SqlKeyStore {
    fn save_key(&self, record: &KeyRecord) -> CryptoResult<()> {
        let stored = record.to_stored();
        self.runtime
            .block_on(
                sqlx::query(
                    "INSERT INTO key_records (kid, scheme, material, created_at, expires_at) \
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&stored.id)
                .bind(stored.scheme.as_str())
                .bind(&stored.material)
                .bind(stored.created_at_ms)
                .bind(stored.expires_at_ms)
                .execute(&self.pool),
            )
            .map_err(|e| db_error("save_key", error_codes::KEY_STORAGE_FAILED, e))?;
        Ok(())
    }

    fn get_all_keys(&self) -> CryptoResult<Vec<KeyRecord>> {
        let rows = self
            .runtime
            .block_on(
                sqlx::query(
                    "SELECT kid, scheme, material, created_at, expires_at \
                     FROM key_records ORDER BY seq DESC",
                )
                .fetch_all(&self.pool),
            )
            .map_err(|e| db_error("get_all_keys", error_codes::KEY_RETRIEVAL_FAILED, e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let read = |e: sqlx::Error| db_error("get_all_keys", error_codes::KEY_RETRIEVAL_FAILED, e);
            let scheme: String = row.try_get("scheme").map_err(read)?;
            let stored = StoredKey {
                id: row.try_get("kid").map_err(read)?,
                scheme: KeyScheme::parse(&scheme)?,
                material: row.try_get("material").map_err(read)?,
                created_at_ms: row.try_get("created_at").map_err(read)?,
                expires_at_ms: row.try_get("expires_at").map_err(read)?,
            };
            records.push(KeyRecord::from_stored(&stored)?);
        }
        Ok(records)
    }

    fn prune(&self, keep_history: usize) -> CryptoResult<()> {
        let keep = i64::try_from(keep_history.saturating_add(1)).unwrap_or(i64::MAX);
        let result = self
            .runtime
            .block_on(
                sqlx::query(
                    "DELETE FROM key_records WHERE seq NOT IN \
                     (SELECT seq FROM key_records ORDER BY seq DESC LIMIT ?)",
                )
                .bind(keep)
                .execute(&self.pool),
            )
            .map_err(|e| db_error("prune", error_codes::KEY_PRUNE_FAILED, e))?;

        if result.rows_affected() > 0 {
            log::debug!("Pruned {} key records from sqlite store", result.rows_affected());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
