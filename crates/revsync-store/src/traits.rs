//! Store trait: the abstract interface for document and revision persistence.
//!
//! This trait keeps replication storage-agnostic. Implementations include
//! SQLite and in-memory (for tests and ephemeral replicas).

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use revsync_core::{DocRevision, DocumentId, ExplicitRevision, RevisionId, RevisionTree};

use crate::error::{Result, StoreError};

/// Outcome of an explicit bulk insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkInsertReport {
    /// Revisions whose body was not held before.
    pub revisions_written: usize,
    /// Documents whose tree changed (each received a new change sequence).
    pub documents_changed: usize,
}

/// One entry of a store's change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// The latest sequence at which this document changed.
    pub seq: u64,
    pub document_id: DocumentId,
}

/// Coarse store statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub name: String,
    /// Documents whose winning revision is not deleted.
    pub doc_count: usize,
    pub update_seq: u64,
    /// Every revision id known to the store, stubs included.
    pub revision_count: usize,
    /// Revisions whose body the store holds.
    pub available_revisions: usize,
}

/// The Store trait: async interface for a revision-tracking document store.
///
/// # Design Notes
///
/// - **Explicit inserts**: `bulk_insert_explicit` never generates revision
///   ids; it merges the given revision and its ancestry into the tree.
/// - **Stubs**: ancestors known only by id, and non-leaf revisions whose
///   bodies were compacted away, stay in the tree without a body.
/// - **Checkpoints**: replication checkpoints are local to a store and never
///   appear in its change feed. Compaction that discards any body drops
///   them, so replications involving the store start over.
#[async_trait]
pub trait Store: Send + Sync {
    /// Stable identifier used to build replication ids.
    fn name(&self) -> &str;

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert revisions with caller-specified ids and ancestry.
    ///
    /// The whole batch is validated before anything is written.
    async fn bulk_insert_explicit(&self, revisions: &[ExplicitRevision]) -> Result<BulkInsertReport>;

    /// Discard the bodies of every non-leaf revision.
    ///
    /// Returns the number of bodies discarded. Compacted revisions can no
    /// longer be read or replicated from this store. When anything was
    /// discarded the store's replication checkpoints are dropped too.
    async fn compact(&self) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// The full revision tree of one document.
    async fn revision_tree(&self, document_id: &DocumentId) -> Result<Option<RevisionTree>>;

    /// Every document's full revision tree, ordered by document id.
    async fn all_revision_trees(&self) -> Result<Vec<RevisionTree>>;

    /// The stored body of an available revision.
    async fn revision_body(
        &self,
        document_id: &DocumentId,
        rev: &RevisionId,
    ) -> Result<Option<serde_json::Value>>;

    /// Documents changed after `since`, ascending by sequence.
    async fn changes_since(&self, since: u64, limit: usize) -> Result<Vec<Change>>;

    async fn info(&self) -> Result<StoreInfo>;

    // ─────────────────────────────────────────────────────────────────────────
    // Replication checkpoints
    // ─────────────────────────────────────────────────────────────────────────

    async fn checkpoint(&self, replication_id: &str) -> Result<Option<u64>>;

    async fn set_checkpoint(&self, replication_id: &str, seq: u64) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Provided
    // ─────────────────────────────────────────────────────────────────────────

    /// Ordinary write: create a revision on top of `parent` with a generated id.
    ///
    /// `parent` must be a current leaf. Without a parent the document must not
    /// have a live leaf.
    async fn put(
        &self,
        document_id: &DocumentId,
        parent: Option<&RevisionId>,
        body: serde_json::Value,
        deleted: bool,
    ) -> Result<RevisionId> {
        let tree = self.revision_tree(document_id).await?;
        let explicit = prepare_put(tree.as_ref(), document_id, parent, body, deleted)?;
        let rev = explicit.rev.clone();
        self.bulk_insert_explicit(std::slice::from_ref(&explicit)).await?;
        Ok(rev)
    }

    /// Read a revision, or the winning revision when `rev` is `None`.
    async fn get(&self, document_id: &DocumentId, rev: Option<&RevisionId>) -> Result<DocRevision> {
        let not_found = |what: String| StoreError::NotFound(format!("{}: {}", document_id, what));

        let tree = self
            .revision_tree(document_id)
            .await?
            .ok_or_else(|| not_found("missing".into()))?;

        let node = match rev {
            Some(rev) => tree.get(rev).ok_or_else(|| not_found(format!("{} missing", rev)))?,
            None => {
                let winner = tree.winner().ok_or_else(|| not_found("missing".into()))?;
                if winner.deleted {
                    return Err(not_found("deleted".into()));
                }
                winner
            }
        };
        if !node.available {
            return Err(not_found(format!("{} missing", node.id)));
        }

        let body = self
            .revision_body(document_id, &node.id)
            .await?
            .ok_or_else(|| not_found(format!("{} missing", node.id)))?;

        Ok(DocRevision {
            document_id: document_id.clone(),
            rev: node.id.clone(),
            deleted: node.deleted,
            body,
        })
    }

    /// The available revisions among `revs`, each with its known ancestry.
    async fn open_revisions(
        &self,
        document_id: &DocumentId,
        revs: &[RevisionId],
    ) -> Result<Vec<ExplicitRevision>> {
        let tree = match self.revision_tree(document_id).await? {
            Some(tree) => tree,
            None => return Ok(Vec::new()),
        };

        let mut out = Vec::with_capacity(revs.len());
        for rev in revs {
            let node = match tree.get(rev) {
                Some(node) if node.available => node,
                _ => continue,
            };
            // compaction may race us; a vanished body is simply not offered
            let Some(body) = self.revision_body(document_id, rev).await? else {
                continue;
            };
            out.push(ExplicitRevision {
                document_id: document_id.clone(),
                rev: rev.clone(),
                history: tree
                    .ancestry(rev)
                    .iter()
                    .map(|r| r.hash().to_string())
                    .collect(),
                deleted: node.deleted,
                body,
            });
        }
        Ok(out)
    }
}

/// Extension trait for common store patterns.
pub trait StoreExt: Store {
    /// Read a revision by string ids, as callers and tests usually hold them.
    fn get_rev(
        &self,
        document_id: &str,
        rev: &str,
    ) -> impl std::future::Future<Output = Result<DocRevision>> + Send;

    /// Insert explicit revisions given in the `_revisions` shape:
    /// `(document id, revision, history newest first)`.
    fn insert_histories(
        &self,
        revisions: &[(&str, &str, &[&str])],
    ) -> impl std::future::Future<Output = Result<BulkInsertReport>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn get_rev(&self, document_id: &str, rev: &str) -> Result<DocRevision> {
        let rev = RevisionId::parse(rev)?;
        self.get(&DocumentId::from(document_id), Some(&rev)).await
    }

    async fn insert_histories(
        &self,
        revisions: &[(&str, &str, &[&str])],
    ) -> Result<BulkInsertReport> {
        let explicit = revisions
            .iter()
            .map(|(doc, rev, history)| ExplicitRevision::parse(doc, rev, history))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.bulk_insert_explicit(&explicit).await
    }
}

/// Build the explicit revision for an ordinary write, enforcing that it
/// extends a current leaf.
pub(crate) fn prepare_put(
    tree: Option<&RevisionTree>,
    document_id: &DocumentId,
    parent: Option<&RevisionId>,
    body: serde_json::Value,
    deleted: bool,
) -> Result<ExplicitRevision> {
    let conflict = |reason: String| StoreError::Conflict {
        document_id: document_id.to_string(),
        reason,
    };

    let history_tail = match (parent, tree) {
        (Some(parent), Some(tree)) => {
            if !tree.is_leaf(parent) {
                return Err(conflict(format!("{} is not a current leaf", parent)));
            }
            tree.ancestry(parent)
        }
        (Some(parent), None) => {
            return Err(conflict(format!("{} does not exist", parent)));
        }
        (None, Some(tree)) if tree.leaves().iter().any(|n| n.available && !n.deleted) => {
            return Err(conflict("document already exists".into()));
        }
        (None, _) => Vec::new(),
    };

    let rev = RevisionId::derive(parent, &body, deleted)?;
    let mut history = vec![rev.hash().to_string()];
    history.extend(history_tail.iter().map(|r| r.hash().to_string()));

    Ok(ExplicitRevision {
        document_id: document_id.clone(),
        rev,
        history,
        deleted,
        body,
    })
}

static ANONYMOUS_STORES: AtomicU64 = AtomicU64::new(1);

/// A process-unique name for stores opened without one.
pub(crate) fn anonymous_name(prefix: &str) -> String {
    format!("{}-{}", prefix, ANONYMOUS_STORES.fetch_add(1, Ordering::Relaxed))
}
