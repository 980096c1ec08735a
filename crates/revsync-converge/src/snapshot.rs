//! Point-in-time view of a replica's revision trees.

use std::collections::BTreeMap;

use revsync_core::{DocumentId, RevisionTree, TreeSummary};
use revsync_store::Result as StoreResult;

use crate::capability::RevisionSource;

/// Every revision tree of one replica, keyed by document.
///
/// Stub revisions are part of the snapshot: a compacted store still knows
/// the ids of the revisions whose bodies it dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    replica: String,
    trees: BTreeMap<DocumentId, RevisionTree>,
}

impl StoreSnapshot {
    pub fn from_trees(replica: impl Into<String>, trees: impl IntoIterator<Item = RevisionTree>) -> Self {
        Self {
            replica: replica.into(),
            trees: trees
                .into_iter()
                .filter(|tree| !tree.is_empty())
                .map(|tree| (tree.document_id().clone(), tree))
                .collect(),
        }
    }

    /// Snapshot every document of `source`.
    pub async fn take<S: RevisionSource + ?Sized>(source: &S) -> StoreResult<Self> {
        let trees = source.read_all_revisions().await?;
        Ok(Self::from_trees(source.replica_name(), trees))
    }

    /// Snapshot only the given documents of `source`.
    pub async fn take_docs<S: RevisionSource + ?Sized>(
        source: &S,
        document_ids: &[DocumentId],
    ) -> StoreResult<Self> {
        let trees = source.read_revisions(document_ids).await?;
        Ok(Self::from_trees(source.replica_name(), trees))
    }

    /// Replace the given documents with their state in `fresh`. Documents
    /// listed but absent from `fresh` are dropped.
    pub fn refresh(&mut self, document_ids: &[DocumentId], fresh: StoreSnapshot) {
        for id in document_ids {
            self.trees.remove(id);
        }
        self.trees.extend(fresh.trees);
    }

    pub fn replica(&self) -> &str {
        &self.replica
    }

    pub fn tree(&self, document_id: &DocumentId) -> Option<&RevisionTree> {
        self.trees.get(document_id)
    }

    pub fn trees(&self) -> impl Iterator<Item = &RevisionTree> {
        self.trees.values()
    }

    pub fn document_ids(&self) -> impl Iterator<Item = &DocumentId> {
        self.trees.keys()
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Revisions across all documents, stubs included.
    pub fn revision_count(&self) -> usize {
        self.trees.values().map(RevisionTree::len).sum()
    }

    /// Longest ancestry chain of any document.
    pub fn max_depth(&self) -> usize {
        self.trees.values().map(RevisionTree::depth).max().unwrap_or(0)
    }

    /// Leaf, non-leaf, deleted and stub counts per document.
    pub fn summaries(&self) -> BTreeMap<DocumentId, TreeSummary> {
        self.trees
            .iter()
            .map(|(id, tree)| (id.clone(), tree.summary()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revsync_store::{MemoryStore, Store, StoreExt};

    #[tokio::test]
    async fn test_snapshot_includes_stubs_and_deleted() {
        let store = MemoryStore::named("local");
        store
            .insert_histories(&[
                ("foobar", "3-a3", &["a3", "a2", "a1"]),
                ("foobar", "2-a2", &["a2", "a1"]),
                ("foobar", "1-a1", &["a1"]),
                ("baz", "1-b1", &["b1"]),
            ])
            .await
            .unwrap();
        store
            .bulk_insert_explicit(&[revsync_core::ExplicitRevision::parse("baz", "2-b2", &["b2", "b1"])
                .unwrap()
                .deleted(true)])
            .await
            .unwrap();
        store.compact().await.unwrap();

        let snapshot = StoreSnapshot::take(&store).await.unwrap();
        assert_eq!(snapshot.replica(), "local");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.revision_count(), 5);
        assert_eq!(snapshot.max_depth(), 3);

        let summaries = snapshot.summaries();
        let foobar = &summaries[&DocumentId::from("foobar")];
        assert_eq!(foobar.leaves, 1);
        assert_eq!(foobar.stubs, 2);
        let baz = &summaries[&DocumentId::from("baz")];
        assert_eq!(baz.deleted, 1);
    }

    #[tokio::test]
    async fn test_take_docs_filters_documents() {
        let store = MemoryStore::new();
        store
            .insert_histories(&[("a", "1-x", &["x"]), ("b", "1-y", &["y"])])
            .await
            .unwrap();

        let snapshot = StoreSnapshot::take_docs(&store, &[DocumentId::from("b"), DocumentId::from("zz")])
            .await
            .unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.tree(&DocumentId::from("b")).is_some());
        assert!(snapshot.tree(&DocumentId::from("a")).is_none());
    }

    #[tokio::test]
    async fn test_refresh_replaces_listed_documents() {
        let store = MemoryStore::new();
        store
            .insert_histories(&[("a", "1-x", &["x"]), ("b", "1-y", &["y"])])
            .await
            .unwrap();
        let mut snapshot = StoreSnapshot::take(&store).await.unwrap();

        store
            .insert_histories(&[("b", "2-z", &["z", "y"]), ("c", "1-c", &["c"])])
            .await
            .unwrap();
        let ids = [DocumentId::from("b")];
        let fresh = StoreSnapshot::take_docs(&store, &ids).await.unwrap();
        snapshot.refresh(&ids, fresh);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.revision_count(), 3);
        assert!(snapshot.tree(&DocumentId::from("c")).is_none());
    }

    #[tokio::test]
    async fn test_empty_store_snapshot() {
        let snapshot = StoreSnapshot::take(&MemoryStore::new()).await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.max_depth(), 0);
    }
}
