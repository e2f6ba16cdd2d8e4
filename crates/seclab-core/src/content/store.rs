//! Persistence layout for the content tree.
//!
//! ```text
//! node/{kind}/{slug}                          -> ContentNode (JSON)
//! child/{pkind}/{pslug}/{kind}/{slug}         -> marker
//! child/_root/{kind}/{slug}                   -> marker (top-level nodes)
//! ```
//!
//! The child index lets a listing fetch one sibling group with a single
//! prefix scan instead of filtering the whole table.

use crate::error::StoreError;
use crate::table::Table;

use super::{ContentNode, NodeKey};

const ROOT: &str = "_root";

fn node_path(key: &NodeKey) -> String {
    format!("node/{}/{}", key.kind, key.slug)
}

fn child_prefix(parent: Option<&NodeKey>) -> String {
    match parent {
        Some(p) => format!("child/{}/{}/", p.kind, p.slug),
        None => format!("child/{ROOT}/"),
    }
}

fn child_path(parent: Option<&NodeKey>, child: &NodeKey) -> String {
    format!("{}{}/{}", child_prefix(parent), child.kind, child.slug)
}

/// Content records and the parent → children index.
#[derive(Debug, Clone)]
pub struct ContentStore {
    table: Table,
}

impl ContentStore {
    #[must_use]
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    /// # Errors
    ///
    /// [`StoreError`] on storage failure.
    pub async fn get(&self, key: &NodeKey) -> Result<Option<ContentNode>, StoreError> {
        self.table.get_json(&node_path(key)).await
    }

    /// Store `node` only if its key is free. `false` means it was taken.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on storage failure.
    pub async fn insert(&self, node: &ContentNode) -> Result<bool, StoreError> {
        self.table.insert_json(&node_path(&node.key()), node).await
    }

    /// # Errors
    ///
    /// [`StoreError`] on storage failure.
    pub async fn save(&self, node: &ContentNode) -> Result<(), StoreError> {
        self.table.put_json(&node_path(&node.key()), node).await
    }

    /// # Errors
    ///
    /// [`StoreError`] on storage failure.
    pub async fn remove(&self, key: &NodeKey) -> Result<(), StoreError> {
        self.table.delete(&node_path(key)).await
    }

    /// Add `child` to `parent`'s index.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on storage failure.
    pub async fn link(&self, parent: Option<&NodeKey>, child: &NodeKey) -> Result<(), StoreError> {
        self.table.put_marker(&child_path(parent, child)).await
    }

    /// Drop `child` from `parent`'s index.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on storage failure.
    pub async fn unlink(&self, parent: Option<&NodeKey>, child: &NodeKey) -> Result<(), StoreError> {
        self.table.delete(&child_path(parent, child)).await
    }

    /// Keys indexed under `parent`, in index order. May include entries
    /// whose record is gone.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on storage failure.
    pub async fn child_keys(&self, parent: Option<&NodeKey>) -> Result<Vec<NodeKey>, StoreError> {
        let entries = self.table.list(&child_prefix(parent)).await?;
        Ok(entries.iter().filter_map(|e| e.parse().ok()).collect())
    }

    /// Records under `parent`, sibling-ordered. Dangling index entries are
    /// skipped.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on storage failure.
    pub async fn children(&self, parent: Option<&NodeKey>) -> Result<Vec<ContentNode>, StoreError> {
        let mut nodes = Vec::new();
        for key in self.child_keys(parent).await? {
            if let Some(node) = self.get(&key).await? {
                nodes.push(node);
            }
        }
        nodes.sort_by(ContentNode::sibling_cmp);
        Ok(nodes)
    }

    /// Every record, in key order.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on storage failure.
    pub async fn all(&self) -> Result<Vec<ContentNode>, StoreError> {
        let mut nodes = Vec::new();
        for entry in self.table.list("node/").await? {
            let Ok(key) = entry.parse::<NodeKey>() else {
                continue;
            };
            if let Some(node) = self.get(&key).await? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use seclab_storage::{MemoryBackend, StorageBackend};

    use super::*;
    use crate::content::{ContentKind, Visibility};
    use crate::table::DEFAULT_TIMEOUT;

    fn node(kind: ContentKind, slug: &str, parent: Option<NodeKey>, order: i64) -> ContentNode {
        let now = Utc::now();
        ContentNode {
            kind,
            slug: slug.to_owned(),
            parent,
            title: slug.to_owned(),
            body: String::new(),
            order,
            visibility: Visibility::Public,
            created_at: now,
            updated_at: now,
            created_by: "admin".to_owned(),
            updated_by: "admin".to_owned(),
        }
    }

    #[test]
    fn layout() {
        let ex = NodeKey::new(ContentKind::Exercise, "sqli");
        let step = NodeKey::new(ContentKind::Step, "intro");
        assert_eq!(node_path(&step), "node/step/intro");
        assert_eq!(child_path(Some(&ex), &step), "child/exercise/sqli/step/intro");
        assert_eq!(child_path(None, &ex), "child/_root/exercise/sqli");
    }

    #[tokio::test]
    async fn children_are_sibling_ordered_and_skip_dangling() {
        let backend = MemoryBackend::new();
        let store = ContentStore::new(Table::new(Arc::new(backend.clone()), "c", DEFAULT_TIMEOUT));
        let ex = NodeKey::new(ContentKind::Exercise, "sqli");

        let mut late = node(ContentKind::Step, "b-late", Some(ex.clone()), 1);
        late.created_at += Duration::seconds(5);
        let early = node(ContentKind::Step, "z-early", Some(ex.clone()), 1);
        let first = node(ContentKind::Step, "c-first", Some(ex.clone()), 0);
        for n in [&late, &early, &first] {
            assert!(store.insert(n).await.unwrap());
            store.link(Some(&ex), &n.key()).await.unwrap();
        }
        store
            .link(Some(&ex), &NodeKey::new(ContentKind::Step, "ghost"))
            .await
            .unwrap();

        let slugs: Vec<String> = store
            .children(Some(&ex))
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.slug)
            .collect();
        assert_eq!(slugs, vec!["c-first", "z-early", "b-late"]);
        assert_eq!(store.child_keys(Some(&ex)).await.unwrap().len(), 4);
        assert!(backend.exists("c/child/exercise/sqli/step/ghost").await.unwrap());
    }

    #[tokio::test]
    async fn sibling_groups_do_not_bleed_into_each_other() {
        let store = ContentStore::new(Table::new(Arc::new(MemoryBackend::new()), "c", DEFAULT_TIMEOUT));
        let a = NodeKey::new(ContentKind::Exercise, "a");
        let ab = NodeKey::new(ContentKind::Exercise, "a-b");
        store.link(Some(&a), &NodeKey::new(ContentKind::Step, "one")).await.unwrap();
        store.link(Some(&ab), &NodeKey::new(ContentKind::Step, "two")).await.unwrap();

        assert_eq!(
            store.child_keys(Some(&a)).await.unwrap(),
            vec![NodeKey::new(ContentKind::Step, "one")]
        );
    }
}
