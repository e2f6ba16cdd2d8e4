//! Storage error types.
//!
//! Variants name the key or prefix involved so a failing call can be traced
//! from the log line alone. Callers above this crate never forward these
//! messages to HTTP clients.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to open or connect to the storage backend.
    #[error("failed to open storage at '{location}': {reason}")]
    Open { location: String, reason: String },

    /// Failed to read a value.
    #[error("failed to read key '{key}': {reason}")]
    Read { key: String, reason: String },

    /// Failed to write a value.
    #[error("failed to write key '{key}': {reason}")]
    Write { key: String, reason: String },

    /// Failed to delete a key.
    #[error("failed to delete key '{key}': {reason}")]
    Delete { key: String, reason: String },

    /// Failed to list keys with the given prefix.
    #[error("failed to list keys with prefix '{prefix}': {reason}")]
    List { prefix: String, reason: String },

    /// Failed to begin or commit a transaction.
    #[error("transaction failed: {reason}")]
    Transaction { reason: String },

    /// A stored key was not valid UTF-8.
    #[error("invalid key encoding: {reason}")]
    InvalidKey { reason: String },
}
