//! Proptest generators for property-based testing.

use proptest::prelude::*;

use revsync_core::{ExplicitRevision, RevisionId};
use serde_json::json;

/// Shape of one generated revision: whether it starts a new root, which
/// earlier revision it extends otherwise (taken modulo the revisions so far),
/// and whether it is a deletion.
pub type RevisionShape = (bool, u32, bool);

fn revision_shape() -> impl Strategy<Value = RevisionShape> {
    (
        prop::bool::weighted(0.2),
        any::<u32>(),
        prop::bool::weighted(0.25),
    )
}

/// A document's revision forest: conflicting roots, forks, deep chains and
/// deletion markers, every revision with its complete history.
///
/// Hashes are `{hash_prefix}{n}`, so forests generated with different
/// prefixes never share a revision id.
pub fn revision_forest(
    document_id: String,
    hash_prefix: &'static str,
    max_revisions: usize,
) -> impl Strategy<Value = Vec<ExplicitRevision>> {
    prop::collection::vec(revision_shape(), 1..=max_revisions.max(1))
        .prop_map(move |shape| forest_from_shape(&document_id, hash_prefix, &shape))
}

/// The contents of a whole store: up to `max_docs` documents named
/// `doc-0`, `doc-1`, ... each with a generated forest.
pub fn store_contents(
    hash_prefix: &'static str,
    max_docs: usize,
    max_revisions: usize,
) -> impl Strategy<Value = Vec<ExplicitRevision>> {
    prop::collection::vec(
        prop::collection::vec(revision_shape(), 1..=max_revisions.max(1)),
        0..=max_docs,
    )
    .prop_map(move |docs| {
        docs.iter()
            .enumerate()
            .flat_map(|(i, shape)| forest_from_shape(&format!("doc-{i}"), hash_prefix, shape))
            .collect()
    })
}

/// Build explicit revisions from a shape. Revision `n` extends an earlier
/// revision unless it is the first or marked as a root.
pub fn forest_from_shape(
    document_id: &str,
    hash_prefix: &str,
    shape: &[RevisionShape],
) -> Vec<ExplicitRevision> {
    let mut histories: Vec<Vec<String>> = Vec::with_capacity(shape.len());
    let mut revisions = Vec::with_capacity(shape.len());

    for (n, (root, parent, deleted)) in shape.iter().enumerate() {
        let hash = format!("{hash_prefix}{n}");
        let mut history = vec![hash.clone()];
        if n > 0 && !root {
            let parent = *parent as usize % n;
            history.extend(histories[parent].iter().cloned());
        }

        let rev = RevisionId::from_parts(history.len() as u64, &hash)
            .expect("generated hashes are non-empty");
        revisions.push(
            ExplicitRevision::new(document_id, rev, history.clone())
                .deleted(*deleted)
                .body(json!({ "n": n })),
        );
        histories.push(history);
    }

    revisions
}
