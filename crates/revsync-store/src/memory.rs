//! In-memory implementation of the Store trait.
//!
//! Same semantics as SQLite, no persistence. Used for tests and for
//! ephemeral replicas.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use revsync_core::{DocumentId, ExplicitRevision, RevisionId, RevisionTree};

use crate::error::{Result, StoreError};
use crate::traits::{anonymous_name, BulkInsertReport, Change, Store, StoreInfo};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    name: String,
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    documents: BTreeMap<DocumentId, StoredDocument>,

    /// Last assigned change sequence.
    update_seq: u64,

    /// Replication checkpoints: replication id -> last sequence.
    checkpoints: HashMap<String, u64>,
}

struct StoredDocument {
    tree: RevisionTree,
    bodies: HashMap<RevisionId, serde_json::Value>,
    seq: u64,
}

impl MemoryStore {
    /// Create a new empty store with a generated name.
    pub fn new() -> Self {
        Self::named(anonymous_name("memory"))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Internal(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Internal(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn bulk_insert_explicit(&self, revisions: &[ExplicitRevision]) -> Result<BulkInsertReport> {
        let mut inner = self.write()?;

        // Stage every tree first so an invalid revision leaves the store untouched
        let mut staged: BTreeMap<DocumentId, (RevisionTree, Vec<(RevisionId, serde_json::Value)>)> =
            BTreeMap::new();
        let mut report = BulkInsertReport::default();

        for explicit in revisions {
            let (tree, bodies) = staged
                .entry(explicit.document_id.clone())
                .or_insert_with(|| {
                    let tree = inner
                        .documents
                        .get(&explicit.document_id)
                        .map(|doc| doc.tree.clone())
                        .unwrap_or_else(|| RevisionTree::new(explicit.document_id.clone()));
                    (tree, Vec::new())
                });

            let outcome = tree.merge_explicit(explicit)?;
            if outcome.body_written {
                bodies.push((explicit.rev.clone(), explicit.body.clone()));
                report.revisions_written += 1;
            }
        }

        for (document_id, (tree, bodies)) in staged {
            let changed = inner
                .documents
                .get(&document_id)
                .map_or(true, |doc| doc.tree != tree);
            if !changed {
                continue;
            }

            inner.update_seq += 1;
            let seq = inner.update_seq;
            let doc = inner
                .documents
                .entry(document_id.clone())
                .or_insert_with(|| StoredDocument {
                    tree: RevisionTree::new(document_id),
                    bodies: HashMap::new(),
                    seq,
                });
            doc.tree = tree;
            doc.bodies.extend(bodies);
            doc.seq = seq;
            report.documents_changed += 1;
        }

        Ok(report)
    }

    async fn compact(&self) -> Result<usize> {
        let mut inner = self.write()?;
        let mut discarded = 0;
        for doc in inner.documents.values_mut() {
            for rev in doc.tree.compact() {
                doc.bodies.remove(&rev);
                discarded += 1;
            }
        }
        if discarded > 0 {
            inner.checkpoints.clear();
        }
        tracing::debug!(store = %self.name, discarded, "compacted");
        Ok(discarded)
    }

    async fn revision_tree(&self, document_id: &DocumentId) -> Result<Option<RevisionTree>> {
        let inner = self.read()?;
        Ok(inner.documents.get(document_id).map(|doc| doc.tree.clone()))
    }

    async fn all_revision_trees(&self) -> Result<Vec<RevisionTree>> {
        let inner = self.read()?;
        Ok(inner.documents.values().map(|doc| doc.tree.clone()).collect())
    }

    async fn revision_body(
        &self,
        document_id: &DocumentId,
        rev: &RevisionId,
    ) -> Result<Option<serde_json::Value>> {
        let inner = self.read()?;
        Ok(inner
            .documents
            .get(document_id)
            .and_then(|doc| doc.bodies.get(rev))
            .cloned())
    }

    async fn changes_since(&self, since: u64, limit: usize) -> Result<Vec<Change>> {
        let inner = self.read()?;

        let mut changes: Vec<Change> = inner
            .documents
            .iter()
            .filter(|(_, doc)| doc.seq > since)
            .map(|(document_id, doc)| Change {
                seq: doc.seq,
                document_id: document_id.clone(),
            })
            .collect();

        changes.sort_by_key(|c| c.seq);
        changes.truncate(limit);
        Ok(changes)
    }

    async fn info(&self) -> Result<StoreInfo> {
        let inner = self.read()?;
        let trees = inner.documents.values().map(|doc| &doc.tree);

        Ok(StoreInfo {
            name: self.name.clone(),
            doc_count: trees
                .clone()
                .filter(|tree| tree.winner().is_some_and(|w| !w.deleted))
                .count(),
            update_seq: inner.update_seq,
            revision_count: trees.clone().map(RevisionTree::len).sum(),
            available_revisions: inner.documents.values().map(|doc| doc.bodies.len()).sum(),
        })
    }

    async fn checkpoint(&self, replication_id: &str) -> Result<Option<u64>> {
        let inner = self.read()?;
        Ok(inner.checkpoints.get(replication_id).copied())
    }

    async fn set_checkpoint(&self, replication_id: &str, seq: u64) -> Result<()> {
        let mut inner = self.write()?;
        inner.checkpoints.insert(replication_id.to_string(), seq);
        Ok(())
    }
}
