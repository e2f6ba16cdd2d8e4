//! Storage backend abstraction for `SecLab`.
//!
//! This crate defines the [`StorageBackend`] trait, a plain key-value
//! interface with one conditional primitive ([`put_if_absent`]) that the
//! content and credential stores build their uniqueness guarantees on. It
//! knows nothing about users, exercises, or JSON.
//!
//! Three implementations are provided:
//!
//! - [`MemoryBackend`]: in-memory, for tests and local development
//! - [`RedbBackend`]: embedded, pure-Rust, backed by redb (feature `redb-backend`)
//! - [`PostgresBackend`]: managed database, backed by sqlx (feature `postgres-backend`)
//!
//! [`put_if_absent`]: StorageBackend::put_if_absent

mod error;
mod memory;
#[cfg(feature = "postgres-backend")]
mod postgres_backend;
#[cfg(feature = "redb-backend")]
mod redb_backend;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "postgres-backend")]
pub use postgres_backend::PostgresBackend;
#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;

/// A pluggable key-value storage backend.
///
/// Keys are UTF-8 strings using `/` as a separator (e.g.
/// `seclab-users/alice`, `seclab-content/node/step/intro`). Values are
/// opaque byte arrays.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a key-value pair, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Store a key-value pair only if the key is not already present.
    ///
    /// Returns `Ok(true)` when the value was written and `Ok(false)` when
    /// the key already existed (nothing is written). Of any number of
    /// concurrent calls for the same absent key, exactly one observes
    /// `true`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StorageError>;

    /// Delete a key. Deleting a non-existent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying backend fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List all keys that start with the given prefix, in ascending
    /// byte order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the underlying backend fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Check whether a key exists in storage.
    ///
    /// The default implementation calls [`get`](StorageBackend::get).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }
}
