//! The content tree.
//!
//! Exercises contain steps and references (and may nest sub-exercises);
//! pages stand alone or nest under other pages. Every node is addressed by
//! its [`NodeKey`]. A hidden node masks its whole subtree from anyone who
//! is not an admin, and a masked node is indistinguishable from an absent
//! one.

mod service;
mod store;
mod transfer;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ContentError;

pub use service::ContentService;
pub use store::ContentStore;
pub use transfer::{ImportFailure, ImportItem, ImportReport, Snapshot};

/// Bound on ancestor walks and cascade recursion.
pub const MAX_DEPTH: usize = 64;

/// Longest accepted slug.
pub const MAX_SLUG_LEN: usize = 128;

/// Longest accepted title, in characters.
pub const MAX_TITLE_LEN: usize = 256;

/// What a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Exercise,
    Step,
    Reference,
    Page,
}

impl ContentKind {
    pub const ALL: [ContentKind; 4] = [Self::Exercise, Self::Step, Self::Reference, Self::Page];

    /// Lowercase name, as used in keys and paths.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exercise => "exercise",
            Self::Step => "step",
            Self::Reference => "reference",
            Self::Page => "page",
        }
    }

    /// Kinds a node of this kind may hang under.
    #[must_use]
    pub fn allowed_parents(self) -> &'static [ContentKind] {
        match self {
            Self::Exercise => &[Self::Exercise],
            Self::Step => &[Self::Exercise],
            Self::Reference => &[Self::Exercise, Self::Step],
            Self::Page => &[Self::Page],
        }
    }

    /// Whether a node of this kind must have a parent.
    #[must_use]
    pub fn requires_parent(self) -> bool {
        matches!(self, Self::Step | Self::Reference)
    }

    /// Check that `parent` is an acceptable placement for this kind.
    ///
    /// # Errors
    ///
    /// [`ContentError::Invalid`] naming the rule.
    pub fn check_parent(self, parent: Option<&NodeKey>) -> Result<(), ContentError> {
        match parent {
            None if self.requires_parent() => Err(ContentError::Invalid {
                reason: format!("a {self} needs a parent"),
            }),
            None => Ok(()),
            Some(p) if self.allowed_parents().contains(&p.kind) => Ok(()),
            Some(p) => Err(ContentError::Invalid {
                reason: format!("a {self} cannot be placed under a {}", p.kind),
            }),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ContentError::Invalid {
                reason: format!("unknown content kind '{s}'"),
            })
    }
}

/// Whether non-admins may see a node (and, transitively, its subtree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Hidden,
}

/// Address of a node: slugs are unique within a kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub kind: ContentKind,
    pub slug: String,
}

impl NodeKey {
    #[must_use]
    pub fn new(kind: ContentKind, slug: impl Into<String>) -> Self {
        Self {
            kind,
            slug: slug.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.slug)
    }
}

impl FromStr for NodeKey {
    type Err = ContentError;

    /// Parse `kind/slug`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, slug) = s.split_once('/').ok_or_else(|| ContentError::Invalid {
            reason: format!("'{s}' is not a kind/slug key"),
        })?;
        validate_slug(slug)?;
        Ok(Self::new(kind.parse()?, slug))
    }
}

/// Validate a slug: 1–128 chars of `[a-z0-9-]`, no leading or trailing `-`.
///
/// # Errors
///
/// [`ContentError::Invalid`] describing the rule that failed.
pub fn validate_slug(slug: &str) -> Result<(), ContentError> {
    let invalid = |reason: &str| ContentError::Invalid {
        reason: format!("slug '{slug}' {reason}"),
    };
    if slug.is_empty() || slug.len() > MAX_SLUG_LEN {
        return Err(invalid("must be 1-128 characters"));
    }
    if !slug
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(invalid("may only contain a-z, 0-9 and '-'"));
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return Err(invalid("must not start or end with '-'"));
    }
    Ok(())
}

pub(crate) fn validate_title(title: &str) -> Result<(), ContentError> {
    if title.trim().is_empty() {
        return Err(ContentError::Invalid {
            reason: "title must not be empty".to_owned(),
        });
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ContentError::Invalid {
            reason: format!("title must be at most {MAX_TITLE_LEN} characters"),
        });
    }
    Ok(())
}

/// A stored node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentNode {
    pub kind: ContentKind,
    pub slug: String,
    pub parent: Option<NodeKey>,
    pub title: String,
    pub body: String,
    pub order: i64,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
}

impl ContentNode {
    /// This node's address.
    #[must_use]
    pub fn key(&self) -> NodeKey {
        NodeKey::new(self.kind, self.slug.clone())
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.visibility == Visibility::Hidden
    }

    /// Sibling order: ordering index, then creation time, then key.
    #[must_use]
    pub fn sibling_cmp(&self, other: &Self) -> Ordering {
        self.order
            .cmp(&other.order)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.kind.cmp(&other.kind))
            .then_with(|| self.slug.cmp(&other.slug))
    }
}

/// Input to [`ContentService::create`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewNode {
    pub kind: ContentKind,
    pub slug: String,
    #[serde(default)]
    pub parent: Option<NodeKey>,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub visibility: Visibility,
}

impl NewNode {
    /// A public, order-0, empty-bodied draft.
    #[must_use]
    pub fn new(kind: ContentKind, slug: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind,
            slug: slug.into(),
            parent: None,
            title: title.into(),
            body: String::new(),
            order: 0,
            visibility: Visibility::Public,
        }
    }

    #[must_use]
    pub fn under(mut self, parent: NodeKey) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visibility = Visibility::Hidden;
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }
}

/// Partial update. `None` leaves a field alone; parent and slug are
/// immutable and rejected if present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodePatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub order: Option<i64>,
    pub visibility: Option<Visibility>,
}

/// Keys removed by a delete, deepest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub deleted: Vec<NodeKey>,
}
