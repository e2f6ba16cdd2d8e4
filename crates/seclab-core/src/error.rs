//! Error types for `seclab-core`.
//!
//! Each subsystem has its own enum with enough context to diagnose a
//! failure from the log line. Every enum reports an [`ErrorKind`], the
//! small fixed taxonomy the HTTP layer maps onto status codes. Messages
//! never contain password hashes, token material, or the signing key.

use std::fmt;

use seclab_storage::StorageError;

use crate::content::NodeKey;
use crate::user::Role;

/// The externally visible failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A unique key is already taken.
    Conflict,
    /// Missing, invalid, or expired credential.
    Unauthorized,
    /// Valid credential, insufficient role.
    Forbidden,
    /// Absent, or masked by visibility.
    NotFound,
    /// The store timed out or failed. The only retryable kind.
    Unavailable,
    /// Malformed input.
    Invalid,
    /// A server-side fault that is none of the above (codec, hashing).
    Internal,
}

impl ErrorKind {
    /// Whether a caller may retry the same request with backoff.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        self == Self::Unavailable
    }

    /// Stable machine-readable name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
            Self::Invalid => "invalid",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from a [`Table`](crate::table::Table).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend returned an error.
    #[error("table '{table}': {source}")]
    Backend {
        table: String,
        #[source]
        source: StorageError,
    },

    /// The backend did not answer within the configured bound.
    #[error("table '{table}': {op} timed out after {after_ms}ms")]
    Timeout {
        table: String,
        op: &'static str,
        after_ms: u128,
    },

    /// A stored value could not be encoded or decoded.
    #[error("table '{table}': codec failure for key '{key}': {reason}")]
    Codec {
        table: String,
        key: String,
        reason: String,
    },
}

impl StoreError {
    /// Taxonomy entry for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Backend { .. } | Self::Timeout { .. } => ErrorKind::Unavailable,
            Self::Codec { .. } => ErrorKind::Internal,
        }
    }
}

/// Errors from the auth service and its guard.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Registration with a username that already exists.
    #[error("username already registered: {username}")]
    UsernameTaken { username: String },

    /// Unknown user, wrong password, or inactive account. Deliberately
    /// indistinguishable.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An operation needed a credential and none was presented.
    #[error("authentication required")]
    MissingCredentials,

    /// The token could not be parsed.
    #[error("malformed token: {reason}")]
    TokenMalformed { reason: String },

    /// The token signature did not verify.
    #[error("token signature mismatch")]
    TokenSignature,

    /// The token is past its expiry.
    #[error("token expired at {expired_at}")]
    TokenExpired { expired_at: i64 },

    /// The principal's role does not satisfy the required one.
    #[error("role '{required}' required")]
    Forbidden { required: Role },

    /// A named user does not exist.
    #[error("user not found: {username}")]
    UserNotFound { username: String },

    /// Input failed validation.
    #[error("invalid input: {reason}")]
    Invalid { reason: String },

    /// Hashing or signing machinery failed.
    #[error("auth internal error: {reason}")]
    Internal { reason: String },

    /// The credential store failed.
    #[error("credential store: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Taxonomy entry for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UsernameTaken { .. } => ErrorKind::Conflict,
            Self::InvalidCredentials
            | Self::MissingCredentials
            | Self::TokenMalformed { .. }
            | Self::TokenSignature
            | Self::TokenExpired { .. } => ErrorKind::Unauthorized,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::UserNotFound { .. } => ErrorKind::NotFound,
            Self::Invalid { .. } => ErrorKind::Invalid,
            Self::Internal { .. } => ErrorKind::Internal,
            Self::Store(e) => e.kind(),
        }
    }
}

/// Errors from body markup validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarkupError {
    /// The body exceeds the size limit.
    #[error("body is {len} bytes, limit is {limit}")]
    TooLarge { len: usize, limit: usize },

    /// A tag outside the allow-list.
    #[error("tag <{tag}> is not allowed")]
    Tag { tag: String },

    /// An attribute outside the allow-list for its tag.
    #[error("attribute '{attr}' is not allowed on <{tag}>")]
    Attribute { tag: String, attr: String },

    /// A URL attribute with a disallowed scheme or target.
    #[error("url in {tag}[{attr}] is not allowed")]
    Url { tag: String, attr: String },

    /// Markup the scanner could not read (unterminated tag or comment).
    #[error("malformed markup at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },
}

/// Errors from the content service.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// Absent, or masked by visibility for this principal.
    #[error("content not found: {key}")]
    NotFound { key: NodeKey },

    /// The (kind, slug) pair is already taken.
    #[error("content already exists: {key}")]
    SlugTaken { key: NodeKey },

    /// Non-cascading delete of a node that still has children.
    #[error("content {key} has {count} child node(s); delete them first or cascade")]
    HasChildren { key: NodeKey, count: usize },

    /// Draft or patch failed validation.
    #[error("invalid content: {reason}")]
    Invalid { reason: String },

    /// The body markup failed validation.
    #[error("invalid body: {0}")]
    Markup(#[from] MarkupError),

    /// The role guard rejected the principal.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The content store failed.
    #[error("content store: {0}")]
    Store(#[from] StoreError),
}

impl ContentError {
    /// Taxonomy entry for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::SlugTaken { .. } | Self::HasChildren { .. } => ErrorKind::Conflict,
            Self::Invalid { .. } | Self::Markup(_) => ErrorKind::Invalid,
            Self::Auth(e) => e.kind(),
            Self::Store(e) => e.kind(),
        }
    }
}
