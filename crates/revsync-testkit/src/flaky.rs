//! Fault injection for stores.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;

use revsync_core::{DocumentId, ExplicitRevision, RevisionId, RevisionTree};
use revsync_store::{BulkInsertReport, Change, Result, Store, StoreError, StoreInfo};

/// Wraps a store and fails a scripted number of calls with
/// `StoreError::Unavailable`, as a dropped connection would.
pub struct FlakyStore<S> {
    inner: S,
    remaining: AtomicU32,
    injected: AtomicU64,
}

impl<S: Store> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(0),
            injected: AtomicU64::new(0),
        }
    }

    /// Fail the next `count` calls.
    pub fn fail_next(&self, count: u32) {
        self.remaining.store(count, Ordering::SeqCst);
    }

    /// Failures injected so far.
    pub fn injected(&self) -> u64 {
        self.injected.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self, operation: &str) -> Result<()> {
        let failed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable(format!(
                "{}: injected failure in {operation}",
                self.inner.name()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: Store> Store for FlakyStore<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn bulk_insert_explicit(&self, revisions: &[ExplicitRevision]) -> Result<BulkInsertReport> {
        self.check("bulk_insert_explicit")?;
        self.inner.bulk_insert_explicit(revisions).await
    }

    async fn compact(&self) -> Result<usize> {
        self.check("compact")?;
        self.inner.compact().await
    }

    async fn revision_tree(&self, document_id: &DocumentId) -> Result<Option<RevisionTree>> {
        self.check("revision_tree")?;
        self.inner.revision_tree(document_id).await
    }

    async fn all_revision_trees(&self) -> Result<Vec<RevisionTree>> {
        self.check("all_revision_trees")?;
        self.inner.all_revision_trees().await
    }

    async fn revision_body(
        &self,
        document_id: &DocumentId,
        rev: &RevisionId,
    ) -> Result<Option<serde_json::Value>> {
        self.check("revision_body")?;
        self.inner.revision_body(document_id, rev).await
    }

    async fn changes_since(&self, since: u64, limit: usize) -> Result<Vec<Change>> {
        self.check("changes_since")?;
        self.inner.changes_since(since, limit).await
    }

    async fn info(&self) -> Result<StoreInfo> {
        self.check("info")?;
        self.inner.info().await
    }

    async fn checkpoint(&self, replication_id: &str) -> Result<Option<u64>> {
        self.check("checkpoint")?;
        self.inner.checkpoint(replication_id).await
    }

    async fn set_checkpoint(&self, replication_id: &str, seq: u64) -> Result<()> {
        self.check("set_checkpoint")?;
        self.inner.set_checkpoint(replication_id, seq).await
    }
}
