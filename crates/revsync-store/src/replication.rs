//! Single-pass replication between two stores.
//!
//! One pass walks the source's change feed from the target's checkpoint and
//! copies what the source can currently surface. It does not guarantee the
//! target ends up with every revision: ancestors are only offered once the
//! target holds a revision that references them, and revisions whose
//! ancestry is incomplete on the source are skipped. Driving passes until
//! two stores are identical is the job of the convergence loop.
//!
//! The checkpoint is written to both stores. A pass resumes from it only
//! when both copies agree; otherwise one side was replaced or compacted
//! since the last pass and the change feed is read from the start.

use revsync_core::{DocumentId, RevisionId, RevisionTree};

use crate::error::Result;
use crate::traits::Store;

/// Options for a single replication pass.
#[derive(Debug, Clone)]
pub struct PassOptions {
    /// Change-feed page size, and the maximum revisions per bulk insert.
    pub batch_size: usize,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self { batch_size: 100 }
    }
}

impl PassOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Result of one replication pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Documents that received at least one new revision body.
    pub docs_written: usize,
    /// Revision bodies written to the target.
    pub revisions_written: usize,
    /// Checkpoint recorded on the target after this pass.
    pub last_seq: u64,
    /// Revisions left behind because their ancestry is incomplete on the source.
    pub skipped: usize,
}

/// Checkpoint id of the `source -> target` replication.
pub fn replication_id<S, T>(source: &S, target: &T) -> String
where
    S: Store + ?Sized,
    T: Store + ?Sized,
{
    format!("{}->{}", source.name(), target.name())
}

/// Revisions of `source` a single pass may copy to `target`, plus the ones
/// held back by an incomplete ancestry chain.
///
/// Leaves are always offered. Non-leaf revisions are offered only once the
/// target already references them, i.e. holds them as stubs.
pub fn surfaced_revisions(
    source: &RevisionTree,
    target: Option<&RevisionTree>,
) -> (Vec<RevisionId>, Vec<RevisionId>) {
    let mut surfaced = Vec::new();
    let mut skipped = Vec::new();

    for node in source.nodes().filter(|n| n.available) {
        let theirs = target.and_then(|t| t.get(&node.id));
        if theirs.is_some_and(|t| t.available) {
            continue;
        }
        let referenced = theirs.is_some();
        if !referenced && !source.is_leaf(&node.id) {
            continue;
        }
        if source.has_complete_ancestry(&node.id) {
            surfaced.push(node.id.clone());
        } else {
            skipped.push(node.id.clone());
        }
    }

    (surfaced, skipped)
}

/// Run one replication pass from `source` to `target`.
pub async fn replicate_once<S, T>(source: &S, target: &T, options: &PassOptions) -> Result<PassReport>
where
    S: Store + ?Sized,
    T: Store + ?Sized,
{
    let replication_id = replication_id(source, target);
    let batch_size = options.batch_size.max(1);
    let recorded = Checkpoints::read(source, target, &replication_id).await?;
    let since = recorded.resume_from();

    let mut report = PassReport::default();
    let mut cursor = since;
    let mut checkpoint = since;
    let mut blocked = false;

    loop {
        let changes = source.changes_since(cursor, batch_size).await?;
        let page_len = changes.len();

        for change in changes {
            cursor = change.seq;
            let complete =
                replicate_document(source, target, &change.document_id, batch_size, &mut report)
                    .await?;

            // Never checkpoint past a document that still needs another pass
            if complete && !blocked {
                checkpoint = change.seq;
            } else {
                blocked = true;
            }
        }

        if page_len < batch_size {
            break;
        }
    }

    recorded
        .write(source, target, &replication_id, checkpoint)
        .await?;
    report.last_seq = checkpoint;

    tracing::debug!(
        replication = %replication_id,
        since,
        checkpoint,
        docs_written = report.docs_written,
        revisions_written = report.revisions_written,
        skipped = report.skipped,
        "replication pass finished"
    );

    Ok(report)
}

/// The checkpoint copies held by each side of a replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Checkpoints {
    source: Option<u64>,
    target: Option<u64>,
}

impl Checkpoints {
    async fn read<S, T>(source: &S, target: &T, replication_id: &str) -> Result<Self>
    where
        S: Store + ?Sized,
        T: Store + ?Sized,
    {
        Ok(Self {
            source: source.checkpoint(replication_id).await?,
            target: target.checkpoint(replication_id).await?,
        })
    }

    fn resume_from(&self) -> u64 {
        match (self.source, self.target) {
            (Some(source), Some(target)) if source == target => target,
            (None, None) => 0,
            (source, target) => {
                tracing::debug!(?source, ?target, "checkpoints disagree, rescanning");
                0
            }
        }
    }

    async fn write<S, T>(&self, source: &S, target: &T, replication_id: &str, seq: u64) -> Result<()>
    where
        S: Store + ?Sized,
        T: Store + ?Sized,
    {
        let stale = |held: Option<u64>| held != Some(seq) && (seq > 0 || held.is_some());
        if stale(self.target) {
            target.set_checkpoint(replication_id, seq).await?;
        }
        if stale(self.source) {
            source.set_checkpoint(replication_id, seq).await?;
        }
        Ok(())
    }
}

/// Copy one document's surfaced revisions. Returns whether the target now
/// holds everything the source has for it.
async fn replicate_document<S, T>(
    source: &S,
    target: &T,
    document_id: &DocumentId,
    batch_size: usize,
    report: &mut PassReport,
) -> Result<bool>
where
    S: Store + ?Sized,
    T: Store + ?Sized,
{
    let Some(source_tree) = source.revision_tree(document_id).await? else {
        return Ok(true);
    };
    let target_tree = target.revision_tree(document_id).await?;

    let (surfaced, skipped) = surfaced_revisions(&source_tree, target_tree.as_ref());
    if !skipped.is_empty() {
        tracing::warn!(
            document = %document_id,
            skipped = ?skipped,
            "revisions with incomplete ancestry cannot be replicated"
        );
        report.skipped += skipped.len();
    }

    if surfaced.is_empty() {
        return Ok(source_tree.missing_in(target_tree.as_ref()).is_empty());
    }

    let revisions = source.open_revisions(document_id, &surfaced).await?;
    let mut written = 0;
    for chunk in revisions.chunks(batch_size) {
        written += target.bulk_insert_explicit(chunk).await?.revisions_written;
    }
    if written > 0 {
        report.docs_written += 1;
        report.revisions_written += written;
    }

    let target_tree = target.revision_tree(document_id).await?;
    Ok(source_tree.missing_in(target_tree.as_ref()).is_empty())
}
