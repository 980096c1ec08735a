//! Reading back every expected revision from a set of stores.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt, TryStreamExt};

use revsync_core::{DocRevision, DocumentId, ExplicitRevision, RevisionId};
use revsync_store::{Result, Store};

/// Expected revisions per document.
pub type DocRevs = BTreeMap<DocumentId, Vec<RevisionId>>;

/// How `has_all_revs` issues its reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// One read at a time, for concurrency-limited transports.
    Serial,
    /// At most this many reads in flight.
    Concurrent(usize),
}

/// Group the revision ids of `revisions` by document, in insertion order.
pub fn doc_revs(revisions: &[ExplicitRevision]) -> DocRevs {
    let mut out = DocRevs::new();
    for revision in revisions {
        let revs = out.entry(revision.document_id.clone()).or_default();
        if !revs.contains(&revision.rev) {
            revs.push(revision.rev.clone());
        }
    }
    out
}

/// Read every (document, revision) pair from every store, in order.
///
/// Fails with the first read error, typically `StoreError::NotFound` for a
/// revision a store does not hold or only holds as a stub.
pub async fn has_all_revs(
    stores: &[&dyn Store],
    expected: &DocRevs,
    mode: Verification,
) -> Result<Vec<DocRevision>> {
    let reads: Vec<(&dyn Store, &DocumentId, &RevisionId)> = expected
        .iter()
        .flat_map(|(doc, revs)| revs.iter().map(move |rev| (doc, rev)))
        .flat_map(|(doc, rev)| stores.iter().map(move |store| (*store, doc, rev)))
        .collect();

    match mode {
        Verification::Serial => {
            let mut results = Vec::with_capacity(reads.len());
            for (store, doc, rev) in reads {
                results.push(store.get(doc, Some(rev)).await?);
            }
            Ok(results)
        }
        Verification::Concurrent(limit) => {
            stream::iter(reads)
                .map(|(store, doc, rev)| async move { store.get(doc, Some(rev)).await })
                .buffered(limit.max(1))
                .try_collect()
                .await
        }
    }
}
