//! Named, timeout-bounded tables over a storage backend.
//!
//! A [`Table`] prefixes every key with its name (`{name}/{key}`), encodes
//! values as JSON, and wraps every backend call in
//! [`tokio::time::timeout`]. A slow or failing backend therefore surfaces
//! as [`StoreError`] with kind `Unavailable` instead of a hung request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use seclab_storage::{StorageBackend, StorageError};

use crate::error::StoreError;

/// Default bound on a single backend call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A key namespace on a shared storage backend.
#[derive(Clone)]
pub struct Table {
    backend: Arc<dyn StorageBackend>,
    name: String,
    timeout: Duration,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Table {
    /// Create a table named `name` on `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            backend,
            name: name.into(),
            timeout,
        }
    }

    /// The table identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}/{key}", self.name)
    }

    async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(StoreError::Backend {
                table: self.name.clone(),
                source,
            }),
            Err(_) => {
                warn!(table = %self.name, op, timeout_ms = self.timeout.as_millis(), "storage call timed out");
                Err(StoreError::Timeout {
                    table: self.name.clone(),
                    op,
                    after_ms: self.timeout.as_millis(),
                })
            }
        }
    }

    fn encode<T: Serialize>(&self, key: &str, value: &T) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(value).map_err(|e| StoreError::Codec {
            table: self.name.clone(),
            key: key.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Read and decode the value at `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on backend failure, timeout, or undecodable data.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let full = self.full_key(key);
        let Some(bytes) = self.call("get", self.backend.get(&full)).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Codec {
                table: self.name.clone(),
                key: key.to_owned(),
                reason: e.to_string(),
            })
    }

    /// Encode and store `value` at `key`, overwriting.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on backend failure, timeout, or encoding failure.
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = self.encode(key, value)?;
        let full = self.full_key(key);
        self.call("put", self.backend.put(&full, &bytes)).await
    }

    /// Encode and store `value` at `key` only if the key is absent.
    ///
    /// Returns `false` when the key was already taken.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on backend failure, timeout, or encoding failure.
    pub async fn insert_json<T: Serialize>(&self, key: &str, value: &T) -> Result<bool, StoreError> {
        let bytes = self.encode(key, value)?;
        let full = self.full_key(key);
        self.call("put_if_absent", self.backend.put_if_absent(&full, &bytes))
            .await
    }

    /// Store an empty marker value at `key` (index entries).
    ///
    /// # Errors
    ///
    /// [`StoreError`] on backend failure or timeout.
    pub async fn put_marker(&self, key: &str) -> Result<(), StoreError> {
        let full = self.full_key(key);
        self.call("put", self.backend.put(&full, &[])).await
    }

    /// Delete `key`. Absent keys are not an error.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on backend failure or timeout.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let full = self.full_key(key);
        self.call("delete", self.backend.delete(&full)).await
    }

    /// List keys under `prefix`, returned relative to `prefix`.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on backend failure or timeout.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let full = self.full_key(prefix);
        let keys = self.call("list", self.backend.list(&full)).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&full).map(str::to_owned))
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Backends that misbehave on purpose.

    use seclab_storage::{StorageBackend, StorageError};

    /// A backend whose every call sleeps longer than any test timeout.
    pub struct StalledBackend;

    #[async_trait::async_trait]
    impl StorageBackend for StalledBackend {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            std::future::pending().await
        }
        async fn put(&self, _key: &str, _value: &[u8]) -> Result<(), StorageError> {
            std::future::pending().await
        }
        async fn put_if_absent(&self, _key: &str, _value: &[u8]) -> Result<bool, StorageError> {
            std::future::pending().await
        }
        async fn delete(&self, _key: &str) -> Result<(), StorageError> {
            std::future::pending().await
        }
        async fn list(&self, _prefix: &str) -> Result<Vec<String>, StorageError> {
            std::future::pending().await
        }
    }

    /// A backend that fails every call.
    pub struct BrokenBackend;

    fn broken(key: &str) -> StorageError {
        StorageError::Read {
            key: key.to_owned(),
            reason: "connection reset".to_owned(),
        }
    }

    #[async_trait::async_trait]
    impl StorageBackend for BrokenBackend {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            Err(broken(key))
        }
        async fn put(&self, key: &str, _value: &[u8]) -> Result<(), StorageError> {
            Err(broken(key))
        }
        async fn put_if_absent(&self, key: &str, _value: &[u8]) -> Result<bool, StorageError> {
            Err(broken(key))
        }
        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            Err(broken(key))
        }
        async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
            Err(broken(prefix))
        }
    }
}
