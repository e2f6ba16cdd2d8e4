//! PostgreSQL storage backend.
//!
//! One `seclab_kv` table holds every key. The conditional write maps onto
//! `INSERT ... ON CONFLICT DO NOTHING`, so the uniqueness guarantee comes
//! from the primary-key constraint rather than from any process-local lock
//! and holds across every server instance sharing the database.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::{StorageBackend, StorageError};

/// A storage backend backed by PostgreSQL.
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend").finish_non_exhaustive()
    }
}

impl PostgresBackend {
    /// Connect to PostgreSQL and create the key-value table if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the connection or the schema
    /// setup fails. The connection string is never included in the error.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let open_err = |reason: String| StorageError::Open {
            location: "postgres".to_owned(),
            reason,
        };

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| open_err(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS seclab_kv (\
                key   TEXT  PRIMARY KEY, \
                value BYTEA NOT NULL\
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| open_err(format!("create table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_seclab_kv_prefix \
             ON seclab_kv (key text_pattern_ops)",
        )
        .execute(&pool)
        .await
        .map_err(|e| open_err(format!("create index: {e}")))?;

        Ok(Self { pool })
    }
}

/// Escape `LIKE` metacharacters so a prefix matches literally.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len().saturating_add(1));
    for ch in prefix.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[async_trait::async_trait]
impl StorageBackend for PostgresBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT value FROM seclab_kv WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Read {
                key: key.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(row.map(|(v,)| v))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO seclab_kv (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Write {
            key: key.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "INSERT INTO seclab_kv (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Write {
            key: key.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM seclab_kv WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Delete {
                key: key.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT key FROM seclab_kv WHERE key LIKE $1 ESCAPE '\\' ORDER BY key COLLATE \"C\"",
        )
        .bind(like_prefix(prefix))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::List {
            prefix: prefix.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(rows.into_iter().map(|(k,)| k).collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let (found,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM seclab_kv WHERE key = $1)")
                .bind(key)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorageError::Read {
                    key: key.to_owned(),
                    reason: e.to_string(),
                })?;
        Ok(found)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::like_prefix;

    #[test]
    fn like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("users/"), "users/%");
        assert_eq!(like_prefix("seclab_users/"), "seclab\\_users/%");
        assert_eq!(like_prefix("100%"), "100\\%%");
    }
}
