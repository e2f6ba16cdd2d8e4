//! HTTP route modules.

pub mod admin;
pub mod auth;
pub mod content;
pub mod sys;

use seclab_core::content::validate_slug;
use seclab_core::{ContentKind, NodeKey};

use crate::error::AppError;

/// Build a [`NodeKey`] from `{kind}/{slug}` path segments.
pub(crate) fn node_key(kind: &str, slug: &str) -> Result<NodeKey, AppError> {
    let kind: ContentKind = kind.parse()?;
    validate_slug(slug)?;
    Ok(NodeKey::new(kind, slug))
}
