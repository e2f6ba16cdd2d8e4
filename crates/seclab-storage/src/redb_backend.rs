//! Embedded redb storage backend.
//!
//! A single-file, pure-Rust B-tree store for deployments that want
//! persistence without running a database server. Every call runs on the
//! Tokio blocking pool; `put_if_absent` checks and inserts inside one
//! write transaction, which redb serializes, so the conditional write is
//! atomic.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::{StorageBackend, StorageError};

/// All keys live in one table; namespacing happens in the key itself.
const DATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("seclab");

/// A storage backend backed by a redb database file.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbBackend {
    /// Open or create a redb database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened or the
    /// data table cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let open_err = |reason: String| StorageError::Open {
            location: path.display().to_string(),
            reason,
        };

        let db = Database::create(path).map_err(|e| open_err(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| open_err(e.to_string()))?;
        txn.open_table(DATA_TABLE)
            .map_err(|e| open_err(format!("create table: {e}")))?;
        txn.commit().map_err(|e| open_err(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Filesystem path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the database on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StorageError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StorageError::Transaction {
                reason: format!("blocking task failed: {e}"),
            })?
    }
}

fn txn_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Transaction {
        reason: e.to_string(),
    }
}

#[async_trait::async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_owned();
        self.blocking(move |db| {
            let read_err = |e: &dyn std::fmt::Display| StorageError::Read {
                key: key.clone(),
                reason: e.to_string(),
            };
            let txn = db.begin_read().map_err(|e| read_err(&e))?;
            let table = txn.open_table(DATA_TABLE).map_err(|e| read_err(&e))?;
            let value = table
                .get(key.as_str())
                .map_err(|e| read_err(&e))?
                .map(|v| v.value().to_vec());
            Ok(value)
        })
        .await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let key = key.to_owned();
        let value = value.to_vec();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(txn_err)?;
            {
                let mut table = txn.open_table(DATA_TABLE).map_err(txn_err)?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| StorageError::Write {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
            }
            txn.commit().map_err(txn_err)
        })
        .await
    }

    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StorageError> {
        let key = key.to_owned();
        let value = value.to_vec();
        self.blocking(move |db| {
            let write_err = |e: &dyn std::fmt::Display| StorageError::Write {
                key: key.clone(),
                reason: e.to_string(),
            };
            let txn = db.begin_write().map_err(txn_err)?;
            {
                let mut table = txn.open_table(DATA_TABLE).map_err(txn_err)?;
                let present = table
                    .get(key.as_str())
                    .map_err(|e| write_err(&e))?
                    .is_some();
                if present {
                    return Ok(false);
                }
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| write_err(&e))?;
            }
            txn.commit().map_err(txn_err)?;
            Ok(true)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let key = key.to_owned();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(txn_err)?;
            {
                let mut table = txn.open_table(DATA_TABLE).map_err(txn_err)?;
                table
                    .remove(key.as_str())
                    .map_err(|e| StorageError::Delete {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
            }
            txn.commit().map_err(txn_err)
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = prefix.to_owned();
        self.blocking(move |db| {
            let list_err = |e: &dyn std::fmt::Display| StorageError::List {
                prefix: prefix.clone(),
                reason: e.to_string(),
            };
            let txn = db.begin_read().map_err(|e| list_err(&e))?;
            let table = txn.open_table(DATA_TABLE).map_err(|e| list_err(&e))?;

            let mut keys = Vec::new();
            for item in table.range(prefix.as_str()..).map_err(|e| list_err(&e))? {
                let (k, _) = item.map_err(|e| list_err(&e))?;
                let key = k.value();
                if !key.starts_with(prefix.as_str()) {
                    break;
                }
                keys.push(key.to_owned());
            }
            Ok(keys)
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, RedbBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("seclab.redb")).unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn put_get_delete() {
        let (_dir, backend) = open_temp();
        backend.put("users/alice", b"a").await.unwrap();
        assert_eq!(backend.get("users/alice").await.unwrap(), Some(b"a".to_vec()));
        backend.delete("users/alice").await.unwrap();
        assert_eq!(backend.get("users/alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_if_absent_refuses_second_write() {
        let (_dir, backend) = open_temp();
        assert!(backend.put_if_absent("k", b"1").await.unwrap());
        assert!(!backend.put_if_absent("k", b"2").await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn list_stops_at_prefix_boundary() {
        let (_dir, backend) = open_temp();
        backend.put("a/1", b"").await.unwrap();
        backend.put("a/2", b"").await.unwrap();
        backend.put("b/1", b"").await.unwrap();
        assert_eq!(backend.list("a/").await.unwrap(), vec!["a/1", "a/2"]);
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seclab.redb");
        {
            let backend = RedbBackend::open(&path).unwrap();
            backend.put("k", b"v").await.unwrap();
        }
        let backend = RedbBackend::open(&path).unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));
    }
}
