//! Revision-level comparison of two snapshots.

use std::collections::{BTreeMap, BTreeSet};

use revsync_core::{DocumentId, RevisionId};

use crate::snapshot::StoreSnapshot;

/// Revisions missing on one side, grouped by document.
pub type MissingRevisions = BTreeMap<DocumentId, BTreeSet<RevisionId>>;

/// Per-document revisions each side lacks relative to the other.
///
/// Leaf, non-leaf, deleted and conflict revisions are all compared; a stub
/// and a full body count as different, two stubs as equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreDiff {
    /// Revisions `b` holds and `a` does not.
    pub missing_in_a: MissingRevisions,
    /// Revisions `a` holds and `b` does not.
    pub missing_in_b: MissingRevisions,
}

impl StoreDiff {
    /// Both stores hold exactly the same revisions.
    pub fn is_equal(&self) -> bool {
        self.missing_in_a.is_empty() && self.missing_in_b.is_empty()
    }

    /// `b` holds everything `a` holds.
    pub fn b_contains_a(&self) -> bool {
        self.missing_in_b.is_empty()
    }

    /// Missing revisions on both sides.
    pub fn missing_count(&self) -> usize {
        count(&self.missing_in_a) + count(&self.missing_in_b)
    }

    /// Documents with a difference on either side.
    pub fn documents(&self) -> BTreeSet<&DocumentId> {
        self.missing_in_a
            .keys()
            .chain(self.missing_in_b.keys())
            .collect()
    }
}

fn count(missing: &MissingRevisions) -> usize {
    missing.values().map(BTreeSet::len).sum()
}

/// Compare two snapshots revision by revision.
pub fn compare(a: &StoreSnapshot, b: &StoreSnapshot) -> StoreDiff {
    StoreDiff {
        missing_in_a: missing_in(b, a),
        missing_in_b: missing_in(a, b),
    }
}

/// Revisions `from` holds that `to` does not.
fn missing_in(from: &StoreSnapshot, to: &StoreSnapshot) -> MissingRevisions {
    from.trees()
        .filter_map(|tree| {
            let missing = tree.missing_in(to.tree(tree.document_id()));
            (!missing.is_empty()).then(|| (tree.document_id().clone(), missing))
        })
        .collect()
}
