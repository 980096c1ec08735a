//! What the convergence loop needs from a replica.
//!
//! The loop only reads full revision trees and triggers single passes. Every
//! [`Store`] provides both; tests can script replicas without a real store.

use async_trait::async_trait;

use revsync_core::{DocumentId, RevisionTree};
use revsync_store::{replicate_once, PassOptions, PassReport, Result as StoreResult, Store};

/// A replica whose full revision trees can be read.
#[async_trait]
pub trait RevisionSource: Send + Sync {
    /// Name used in logs and errors.
    fn replica_name(&self) -> &str;

    /// Every revision tree, stubs included, in document order.
    async fn read_all_revisions(&self) -> StoreResult<Vec<RevisionTree>>;

    /// Revision trees for the given documents only. Documents the replica
    /// does not hold are omitted.
    async fn read_revisions(&self, document_ids: &[DocumentId]) -> StoreResult<Vec<RevisionTree>> {
        let trees = self.read_all_revisions().await?;
        Ok(trees
            .into_iter()
            .filter(|tree| document_ids.contains(tree.document_id()))
            .collect())
    }
}

/// A replica that can push one replication pass into `T`.
#[async_trait]
pub trait PassReplicator<T: ?Sized + Sync>: Send + Sync {
    async fn replicate_single_pass(&self, target: &T, options: &PassOptions) -> StoreResult<PassReport>;
}

#[async_trait]
impl<S: Store + ?Sized> RevisionSource for S {
    fn replica_name(&self) -> &str {
        self.name()
    }

    async fn read_all_revisions(&self) -> StoreResult<Vec<RevisionTree>> {
        self.all_revision_trees().await
    }

    async fn read_revisions(&self, document_ids: &[DocumentId]) -> StoreResult<Vec<RevisionTree>> {
        let mut trees = Vec::with_capacity(document_ids.len());
        for id in document_ids {
            if let Some(tree) = self.revision_tree(id).await? {
                trees.push(tree);
            }
        }
        Ok(trees)
    }
}

#[async_trait]
impl<S, T> PassReplicator<T> for S
where
    S: Store + ?Sized,
    T: Store + ?Sized,
{
    async fn replicate_single_pass(&self, target: &T, options: &PassOptions) -> StoreResult<PassReport> {
        replicate_once(self, target, options).await
    }
}
