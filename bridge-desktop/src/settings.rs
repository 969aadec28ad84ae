//! Settings Storage using SQLite
//!
//! The local library lives here: one row per key, values stored as text.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{SettingsStore, SettingsTransaction},
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
"#;

const UPSERT: &str = r#"
    INSERT INTO settings (key, value, updated_at)
    VALUES (?, ?, ?)
    ON CONFLICT(key) DO UPDATE SET
        value = excluded.value,
        updated_at = excluded.updated_at
"#;

fn db_error(context: &str, e: sqlx::Error) -> BridgeError {
    BridgeError::StorageError(format!("{}: {}", context, e))
}

/// SQLite-backed settings store implementation
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

impl SqliteSettingsStore {
    /// Open (creating if needed) the settings database at `db_path`
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| db_error("Failed to open settings database", e))?;

        let store = Self { pool };
        store.migrate().await?;

        debug!(path = ?db_path, "Initialized settings store");
        Ok(store)
    }

    /// Create an in-memory settings store (for testing)
    ///
    /// Every pooled connection to `:memory:` is a separate database, so the
    /// pool is pinned to a single connection that is never recycled.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| db_error("Invalid in-memory URL", e))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| db_error("Failed to open in-memory database", e))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to create settings table", e))?;
        Ok(())
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(UPSERT)
            .bind(key)
            .bind(value)
            .bind(Self::now())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to set setting", e))?;

        debug!(key, bytes = value.len(), "Stored setting");
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get setting", e))?;

        Ok(row.map(|row| row.get(0)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete setting", e))?;

        debug!(key, "Deleted setting");
        Ok(())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to check key", e))?;

        Ok(row.is_some())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list keys", e))?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM settings")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to clear settings", e))?;

        debug!("Cleared all settings");
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn SettingsTransaction + Send>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        Ok(Box::new(SqliteSettingsTransaction { tx: Some(tx) }))
    }
}

/// SQLite settings transaction
///
/// Dropping it without `commit` rolls back.
struct SqliteSettingsTransaction {
    tx: Option<sqlx::Transaction<'static, sqlx::Sqlite>>,
}

impl SqliteSettingsTransaction {
    fn active(&mut self) -> Result<&mut sqlx::Transaction<'static, sqlx::Sqlite>> {
        self.tx.as_mut().ok_or_else(|| {
            BridgeError::StorageError("Transaction already finished".to_string())
        })
    }
}

#[async_trait]
impl SettingsTransaction for SqliteSettingsTransaction {
    async fn set_string(&mut self, key: &str, value: &str) -> Result<()> {
        let tx = self.active()?;
        sqlx::query(UPSERT)
            .bind(key)
            .bind(value)
            .bind(SqliteSettingsStore::now())
            .execute(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to set setting", e))?;
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<()> {
        let tx = self.active()?;
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to delete setting", e))?;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| {
            BridgeError::StorageError("Transaction already finished".to_string())
        })?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit", e))?;

        debug!("Committed settings transaction");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| {
            BridgeError::StorageError("Transaction already finished".to_string())
        })?;

        tx.rollback()
            .await
            .map_err(|e| db_error("Failed to rollback", e))?;

        debug!("Rolled back settings transaction");
        Ok(())
    }
}
