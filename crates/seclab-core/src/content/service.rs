//! Content operations with role checks and visibility masking.

use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use tracing::{info, warn};

use crate::auth::{Principal, require_role};
use crate::error::ContentError;
use crate::markup::MarkupPolicy;
use crate::table::Table;
use crate::user::Role;

use super::{
    ContentKind, ContentNode, ContentStore, DeleteReport, MAX_DEPTH, NewNode, NodeKey, NodePatch,
    validate_slug, validate_title,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Reads and writes on the content tree.
#[derive(Debug, Clone)]
pub struct ContentService {
    store: ContentStore,
    markup: MarkupPolicy,
}

impl ContentService {
    /// A service over the content table, validating bodies with `markup`.
    #[must_use]
    pub fn new(table: Table, markup: MarkupPolicy) -> Self {
        Self {
            store: ContentStore::new(table),
            markup,
        }
    }

    pub(crate) fn store(&self) -> &ContentStore {
        &self.store
    }

    pub(crate) fn markup(&self) -> &MarkupPolicy {
        &self.markup
    }

    /// Whether `node` is visible to `principal`: admins see everything;
    /// everyone else needs the node and all its ancestors public.
    ///
    /// A parent reference that points nowhere masks the node.
    async fn is_visible(&self, node: &ContentNode, principal: &Principal) -> Result<bool, ContentError> {
        if principal.is_admin() {
            return Ok(true);
        }
        if node.is_hidden() {
            return Ok(false);
        }
        let mut next = node.parent.clone();
        for _ in 0..MAX_DEPTH {
            let Some(key) = next else {
                return Ok(true);
            };
            match self.store.get(&key).await? {
                Some(ancestor) if !ancestor.is_hidden() => next = ancestor.parent,
                _ => return Ok(false),
            }
        }
        Err(ContentError::Invalid {
            reason: format!("ancestry of {} exceeds {MAX_DEPTH} levels", node.key()),
        })
    }

    /// Fetch `key` if it exists and `principal` may see it.
    async fn resolve(&self, key: &NodeKey, principal: &Principal) -> Result<ContentNode, ContentError> {
        let not_found = || ContentError::NotFound { key: key.clone() };
        let node = self.store.get(key).await?.ok_or_else(not_found)?;
        if self.is_visible(&node, principal).await? {
            Ok(node)
        } else {
            Err(not_found())
        }
    }

    /// A single node.
    ///
    /// # Errors
    ///
    /// - [`ContentError::NotFound`] if absent or masked for `principal`.
    /// - [`ContentError::Store`] on storage failure.
    pub async fn get(&self, key: &NodeKey, principal: &Principal) -> Result<ContentNode, ContentError> {
        self.resolve(key, principal).await
    }

    /// Children of `parent` (top-level nodes for `None`), optionally of one
    /// kind, sibling-ordered and filtered for `principal`.
    ///
    /// # Errors
    ///
    /// - [`ContentError::NotFound`] if `parent` is absent or masked.
    /// - [`ContentError::Store`] on storage failure.
    pub async fn list_children(
        &self,
        parent: Option<&NodeKey>,
        kind: Option<ContentKind>,
        principal: &Principal,
    ) -> Result<Vec<ContentNode>, ContentError> {
        if let Some(parent) = parent {
            self.resolve(parent, principal).await?;
        }
        // The parent is visible, so a child is visible iff its own flag is.
        let admin = principal.is_admin();
        Ok(self
            .store
            .children(parent)
            .await?
            .into_iter()
            .filter(|n| kind.is_none_or(|k| n.kind == k))
            .filter(|n| admin || !n.is_hidden())
            .collect())
    }

    /// Every node, hidden ones included. Admin only.
    ///
    /// # Errors
    ///
    /// Guard errors, or [`ContentError::Store`].
    pub async fn list_all(&self, principal: &Principal) -> Result<Vec<ContentNode>, ContentError> {
        require_role(principal, Role::Admin)?;
        let mut nodes = self.store.all().await?;
        nodes.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.sibling_cmp(b)));
        Ok(nodes)
    }

    /// Validate a placement: parent kind rules, and the parent must exist.
    pub(crate) async fn check_placement(
        &self,
        kind: ContentKind,
        parent: Option<&NodeKey>,
    ) -> Result<(), ContentError> {
        kind.check_parent(parent)?;
        if let Some(parent) = parent {
            if self.store.get(parent).await?.is_none() {
                return Err(ContentError::Invalid {
                    reason: format!("parent {parent} does not exist"),
                });
            }
        }
        Ok(())
    }

    /// Conditionally write `node`, then index it under its parent. If the
    /// index write fails the record is removed again.
    pub(crate) async fn persist_new(&self, node: &ContentNode) -> Result<bool, ContentError> {
        if !self.store.insert(node).await? {
            return Ok(false);
        }
        let key = node.key();
        if let Err(e) = self.store.link(node.parent.as_ref(), &key).await {
            warn!(%key, error = %e, "child index write failed, rolling back");
            if let Err(rollback) = self.store.remove(&key).await {
                warn!(%key, error = %rollback, "rollback failed, record left unindexed");
            }
            return Err(e.into());
        }
        Ok(true)
    }

    /// Create a node. Admin only.
    ///
    /// # Errors
    ///
    /// - Guard errors from [`require_role`].
    /// - [`ContentError::Invalid`] or [`ContentError::Markup`] for a bad draft.
    /// - [`ContentError::SlugTaken`] if `(kind, slug)` exists.
    /// - [`ContentError::Store`] on storage failure.
    pub async fn create(&self, draft: NewNode, principal: &Principal) -> Result<ContentNode, ContentError> {
        require_role(principal, Role::Admin)?;
        let author = principal.username().unwrap_or_default().to_owned();

        validate_slug(&draft.slug)?;
        validate_title(&draft.title)?;
        self.markup.validate(&draft.body)?;
        self.check_placement(draft.kind, draft.parent.as_ref()).await?;

        let now = Utc::now();
        let node = ContentNode {
            kind: draft.kind,
            slug: draft.slug,
            parent: draft.parent,
            title: draft.title,
            body: draft.body,
            order: draft.order,
            visibility: draft.visibility,
            created_at: now,
            updated_at: now,
            created_by: author.clone(),
            updated_by: author,
        };

        let key = node.key();
        if !self.persist_new(&node).await? {
            return Err(ContentError::SlugTaken { key });
        }
        info!(%key, by = %node.created_by, "content created");
        Ok(node)
    }

    /// Apply a partial update. Admin only.
    ///
    /// # Errors
    ///
    /// - Guard errors from [`require_role`].
    /// - [`ContentError::NotFound`] if absent.
    /// - [`ContentError::Invalid`] or [`ContentError::Markup`] for bad fields.
    /// - [`ContentError::Store`] on storage failure.
    pub async fn update(
        &self,
        key: &NodeKey,
        patch: NodePatch,
        principal: &Principal,
    ) -> Result<ContentNode, ContentError> {
        require_role(principal, Role::Admin)?;
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        if let Some(body) = &patch.body {
            self.markup.validate(body)?;
        }

        let mut node = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| ContentError::NotFound { key: key.clone() })?;

        if let Some(title) = patch.title {
            node.title = title;
        }
        if let Some(body) = patch.body {
            node.body = body;
        }
        if let Some(order) = patch.order {
            node.order = order;
        }
        if let Some(visibility) = patch.visibility {
            node.visibility = visibility;
        }
        node.updated_at = Utc::now();
        principal.username().unwrap_or_default().clone_into(&mut node.updated_by);

        self.store.save(&node).await?;
        info!(%key, by = %node.updated_by, "content updated");
        Ok(node)
    }

    /// Delete a node. Admin only.
    ///
    /// Without `cascade`, a node with children is refused. With it, the
    /// subtree goes depth-first, children before parents.
    ///
    /// # Errors
    ///
    /// - Guard errors from [`require_role`].
    /// - [`ContentError::NotFound`] if absent.
    /// - [`ContentError::HasChildren`] if not cascading and children exist.
    /// - [`ContentError::Store`] on storage failure.
    pub async fn delete(
        &self,
        key: &NodeKey,
        cascade: bool,
        principal: &Principal,
    ) -> Result<DeleteReport, ContentError> {
        require_role(principal, Role::Admin)?;
        let node = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| ContentError::NotFound { key: key.clone() })?;

        if !cascade {
            let count = self.store.children(Some(key)).await?.len();
            if count > 0 {
                return Err(ContentError::HasChildren {
                    key: key.clone(),
                    count,
                });
            }
        }

        let mut report = DeleteReport::default();
        self.delete_subtree(node, 0, &mut report).await?;
        info!(
            %key,
            cascade,
            removed = report.deleted.len(),
            by = principal.username().unwrap_or_default(),
            "content deleted"
        );
        Ok(report)
    }

    fn delete_subtree<'a>(
        &'a self,
        node: ContentNode,
        depth: usize,
        report: &'a mut DeleteReport,
    ) -> BoxFuture<'a, Result<(), ContentError>> {
        Box::pin(async move {
            let key = node.key();
            if depth >= MAX_DEPTH {
                return Err(ContentError::Invalid {
                    reason: format!("subtree under {key} exceeds {MAX_DEPTH} levels"),
                });
            }

            for child_key in self.store.child_keys(Some(&key)).await? {
                match self.store.get(&child_key).await? {
                    Some(child) => self.delete_subtree(child, depth + 1, report).await?,
                    None => self.store.unlink(Some(&key), &child_key).await?,
                }
            }

            self.store.remove(&key).await?;
            self.store.unlink(node.parent.as_ref(), &key).await?;
            report.deleted.push(key);
            Ok(())
        })
    }
}
