//! Core library for `SecLab`.
//!
//! Holds the two components with real rules in them: the auth service
//! (credential store, Argon2id password checks, HS256 session tokens, the
//! [`require_role`](auth::require_role) guard) and the content service
//! (the exercise → step → reference tree and its inherited visibility).
//! Both sit on [`table::Table`], a namespaced, timeout-bounded view of a
//! `seclab-storage` backend. Nothing here knows about HTTP.

pub mod auth;
pub mod content;
pub mod error;
pub mod markup;
pub mod password;
pub mod table;
pub mod token;
pub mod user;

pub use auth::{AuthConfig, AuthService, Principal, require_role};
pub use content::{ContentKind, ContentNode, ContentService, NodeKey, Visibility};
pub use error::ErrorKind;
pub use user::{Role, User};
