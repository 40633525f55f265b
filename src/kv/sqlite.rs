//! SQLite-backed key-value store

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use super::{KvError, KvStore};

/// Key-value store over the `kv` table
#[derive(Debug, Clone)]
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    /// Create a store over a migrated pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), KvError> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!("kv put {} ({} bytes)", key, value.len());
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool, KvError> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = match expected {
            Some(expected) => {
                sqlx::query("UPDATE kv SET value = ?, updated_at = ? WHERE key = ? AND value = ?")
                    .bind(new)
                    .bind(&now)
                    .bind(key)
                    .bind(expected)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query(
                    "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?) \
                     ON CONFLICT(key) DO NOTHING",
                )
                .bind(key)
                .bind(new)
                .bind(&now)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    async fn health_check(&self) -> Result<(), KvError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
