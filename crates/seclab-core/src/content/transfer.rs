//! Bulk export and import of the content tree.
//!
//! An export is `{export_date, content_items}`. Import accepts the same
//! shape, which is also what the legacy migration job produces, so items
//! may omit timestamps, authorship, ordering and visibility.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{Principal, require_role};
use crate::error::ContentError;
use crate::user::Role;

use super::{
    ContentKind, ContentNode, ContentService, MAX_DEPTH, NodeKey, Visibility, validate_slug,
    validate_title,
};

/// A full dump of the content table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub export_date: DateTime<Utc>,
    pub content_items: Vec<ImportItem>,
}

/// One imported node. Missing bookkeeping fields are filled in at import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportItem {
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl ImportItem {
    #[must_use]
    pub fn key(&self) -> NodeKey {
        NodeKey::new(self.kind, self.slug.clone())
    }

    fn into_node(self, importer: &str, now: DateTime<Utc>) -> ContentNode {
        let created_by = self.created_by.unwrap_or_else(|| importer.to_owned());
        ContentNode {
            kind: self.kind,
            slug: self.slug,
            parent: self.parent,
            title: self.title,
            body: self.body,
            order: self.order,
            visibility: self.visibility,
            created_at: self.created_at.unwrap_or(now),
            updated_at: self.updated_at.unwrap_or(now),
            updated_by: self.updated_by.unwrap_or_else(|| created_by.clone()),
            created_by,
        }
    }
}

impl From<ContentNode> for ImportItem {
    fn from(node: ContentNode) -> Self {
        Self {
            kind: node.kind,
            slug: node.slug,
            parent: node.parent,
            title: node.title,
            body: node.body,
            order: node.order,
            visibility: node.visibility,
            created_at: Some(node.created_at),
            updated_at: Some(node.updated_at),
            created_by: Some(node.created_by),
            updated_by: Some(node.updated_by),
        }
    }
}

/// An item that could not be imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    pub key: String,
    pub reason: String,
}

/// Outcome of an import, item by item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub created: Vec<NodeKey>,
    pub skipped: Vec<NodeKey>,
    pub failed: Vec<ImportFailure>,
}

/// Depth of each item within the snapshot, counting only parents that are
/// themselves in the snapshot. `None` marks a cycle or an over-deep chain.
fn snapshot_depths(items: &[ImportItem]) -> Vec<Option<usize>> {
    let index: HashMap<NodeKey, usize> = items.iter().enumerate().map(|(i, it)| (it.key(), i)).collect();
    items
        .iter()
        .map(|item| {
            let mut depth = 0;
            let mut parent = item.parent.as_ref();
            while let Some(i) = parent.and_then(|p| index.get(p)) {
                depth += 1;
                if depth > MAX_DEPTH {
                    return None;
                }
                parent = items[*i].parent.as_ref();
            }
            Some(depth)
        })
        .collect()
}

impl ContentService {
    /// Every node as a snapshot, parents before children. Admin only.
    ///
    /// # Errors
    ///
    /// Guard errors, or [`ContentError::Store`].
    pub async fn export(&self, principal: &Principal) -> Result<Snapshot, ContentError> {
        let nodes = self.list_all(principal).await?;
        let items: Vec<ImportItem> = nodes.into_iter().map(ImportItem::from).collect();
        let depths = snapshot_depths(&items);
        let mut ordered: Vec<(usize, ImportItem)> = depths
            .into_iter()
            .map(|d| d.unwrap_or(usize::MAX))
            .zip(items)
            .collect();
        ordered.sort_by_key(|(depth, _)| *depth);

        info!(count = ordered.len(), "content exported");
        Ok(Snapshot {
            export_date: Utc::now(),
            content_items: ordered.into_iter().map(|(_, item)| item).collect(),
        })
    }

    /// Create every item that does not exist yet. Admin only.
    ///
    /// Items are created parents first with the conditional write. Existing
    /// keys are skipped, invalid items are reported as failed, and neither
    /// stops the batch. Re-running the same import is harmless.
    ///
    /// # Errors
    ///
    /// Guard errors, or [`ContentError::Store`] if the store fails midway
    /// (everything created so far stays).
    pub async fn import(&self, snapshot: Snapshot, principal: &Principal) -> Result<ImportReport, ContentError> {
        require_role(principal, Role::Admin)?;
        let importer = principal.username().unwrap_or_default().to_owned();
        let now = Utc::now();

        let depths = snapshot_depths(&snapshot.content_items);
        let mut report = ImportReport::default();
        let mut ordered = Vec::with_capacity(depths.len());
        for (depth, item) in depths.into_iter().zip(snapshot.content_items) {
            match depth {
                Some(d) => ordered.push((d, item)),
                None => report.failed.push(ImportFailure {
                    key: item.key().to_string(),
                    reason: format!("parent chain is cyclic or deeper than {MAX_DEPTH}"),
                }),
            }
        }
        ordered.sort_by_key(|(depth, _)| *depth);

        for (_, item) in ordered {
            let key = item.key();
            match self.check_item(&item).await {
                Ok(()) => {}
                Err(ContentError::Store(e)) => return Err(e.into()),
                Err(e) => {
                    warn!(%key, error = %e, "import item rejected");
                    report.failed.push(ImportFailure {
                        key: key.to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            }

            if self.persist_new(&item.into_node(&importer, now)).await? {
                report.created.push(key);
            } else {
                report.skipped.push(key);
            }
        }

        info!(
            created = report.created.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            by = %importer,
            "content imported"
        );
        Ok(report)
    }

    async fn check_item(&self, item: &ImportItem) -> Result<(), ContentError> {
        validate_slug(&item.slug)?;
        validate_title(&item.title)?;
        self.markup().validate(&item.body)?;
        self.check_placement(item.kind, item.parent.as_ref()).await
    }
}
