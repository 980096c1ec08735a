//! Revision trees: the full ancestry and conflict forest of one document.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::revision::ExplicitRevision;
use crate::types::{DocumentId, RevisionId};

/// One revision in a document's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionNode {
    pub id: RevisionId,
    pub document_id: DocumentId,
    pub parent: Option<RevisionId>,
    pub deleted: bool,
    /// Whether the store holds this revision's body. Ancestors known only by
    /// id, and compacted non-leaf revisions, are stubs.
    pub available: bool,
}

impl RevisionNode {
    pub fn is_stub(&self) -> bool {
        !self.available
    }
}

/// Counts of a tree's revisions by shape and state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSummary {
    pub revisions: usize,
    pub leaves: usize,
    pub non_leaves: usize,
    pub deleted: usize,
    pub live: usize,
    pub stubs: usize,
}

/// What a merge changed in a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The revision's body is new to this tree (new node or upgraded stub).
    pub body_written: bool,
    /// Any node was added or modified.
    pub tree_changed: bool,
}

/// The revision forest of a single document.
///
/// Nodes are keyed by revision id, so iteration runs in generation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionTree {
    document_id: DocumentId,
    nodes: BTreeMap<RevisionId, RevisionNode>,
}

impl RevisionTree {
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            document_id,
            nodes: BTreeMap::new(),
        }
    }

    /// Assemble a tree from stored nodes.
    pub fn from_nodes(
        document_id: DocumentId,
        nodes: impl IntoIterator<Item = RevisionNode>,
    ) -> Result<Self> {
        let mut tree = Self::new(document_id);
        for node in nodes {
            if node.document_id != tree.document_id {
                return Err(CoreError::DocumentMismatch {
                    rev: node.id,
                    expected: tree.document_id,
                    found: node.document_id,
                });
            }
            tree.nodes.insert(node.id.clone(), node);
        }
        Ok(tree)
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, rev: &RevisionId) -> Option<&RevisionNode> {
        self.nodes.get(rev)
    }

    pub fn contains(&self, rev: &RevisionId) -> bool {
        self.nodes.contains_key(rev)
    }

    /// All nodes in generation order.
    pub fn nodes(&self) -> impl Iterator<Item = &RevisionNode> {
        self.nodes.values()
    }

    pub fn rev_ids(&self) -> BTreeSet<RevisionId> {
        self.nodes.keys().cloned().collect()
    }

    /// Revisions referenced as a parent by some node in this tree.
    fn referenced(&self) -> BTreeSet<&RevisionId> {
        self.nodes.values().filter_map(|n| n.parent.as_ref()).collect()
    }

    pub fn is_leaf(&self, rev: &RevisionId) -> bool {
        self.contains(rev) && !self.nodes.values().any(|n| n.parent.as_ref() == Some(rev))
    }

    pub fn children(&self, rev: &RevisionId) -> Vec<&RevisionNode> {
        self.nodes
            .values()
            .filter(|n| n.parent.as_ref() == Some(rev))
            .collect()
    }

    /// Nodes without children: the heads of every branch, conflicts included.
    pub fn leaves(&self) -> Vec<&RevisionNode> {
        let referenced = self.referenced();
        self.nodes
            .values()
            .filter(|n| !referenced.contains(&n.id))
            .collect()
    }

    pub fn non_leaves(&self) -> Vec<&RevisionNode> {
        let referenced = self.referenced();
        self.nodes
            .values()
            .filter(|n| referenced.contains(&n.id))
            .collect()
    }

    /// Available deletion markers.
    pub fn deleted(&self) -> Vec<&RevisionNode> {
        self.nodes
            .values()
            .filter(|n| n.available && n.deleted)
            .collect()
    }

    /// Available revisions that are not deletion markers.
    pub fn live(&self) -> Vec<&RevisionNode> {
        self.nodes
            .values()
            .filter(|n| n.available && !n.deleted)
            .collect()
    }

    pub fn stubs(&self) -> Vec<&RevisionNode> {
        self.nodes.values().filter(|n| n.is_stub()).collect()
    }

    /// `rev` followed by every known ancestor, newest first.
    ///
    /// Stops at the first parent missing from the tree.
    pub fn ancestry(&self, rev: &RevisionId) -> Vec<RevisionId> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(rev);
        while let Some(node) = current {
            // generations strictly decrease along a chain, so this bound is
            // only hit by corrupt data
            if chain.len() > self.nodes.len() {
                break;
            }
            chain.push(node.id.clone());
            current = node.parent.as_ref().and_then(|p| self.nodes.get(p));
        }
        chain
    }

    /// Whether every ancestor of `rev` down to a generation-1 root is known.
    pub fn has_complete_ancestry(&self, rev: &RevisionId) -> bool {
        let mut current = match self.nodes.get(rev) {
            Some(node) => node,
            None => return false,
        };
        for _ in 0..=self.nodes.len() {
            match &current.parent {
                None => return current.id.generation() == 1,
                Some(parent) => match self.nodes.get(parent) {
                    Some(node) => current = node,
                    None => return false,
                },
            }
        }
        false
    }

    /// Length of the longest chain in the tree.
    pub fn depth(&self) -> usize {
        let mut depths: HashMap<&RevisionId, usize> = HashMap::with_capacity(self.nodes.len());
        let mut deepest = 0;
        // parents sort before their children, so each parent depth is ready
        for node in self.nodes.values() {
            let d = node
                .parent
                .as_ref()
                .and_then(|p| depths.get(p))
                .map_or(1, |d| d + 1);
            depths.insert(&node.id, d);
            deepest = deepest.max(d);
        }
        deepest
    }

    /// The winning revision: live leaves beat deleted ones, then the highest
    /// generation, then the greatest id.
    pub fn winner(&self) -> Option<&RevisionNode> {
        self.leaves()
            .into_iter()
            .filter(|n| n.available)
            .max_by(|a, b| {
                (!a.deleted)
                    .cmp(&!b.deleted)
                    .then_with(|| a.id.generation().cmp(&b.id.generation()))
                    .then_with(|| a.id.as_str().cmp(b.id.as_str()))
            })
    }

    pub fn summary(&self) -> TreeSummary {
        let leaves = self.leaves().len();
        TreeSummary {
            revisions: self.nodes.len(),
            leaves,
            non_leaves: self.nodes.len() - leaves,
            deleted: self.deleted().len(),
            live: self.live().len(),
            stubs: self.stubs().len(),
        }
    }

    /// Merge an explicitly identified revision and its ancestry.
    ///
    /// Unknown ancestors become stubs, missing parent links are filled in, and
    /// an existing stub for the revision itself is upgraded. Merging a
    /// revision that is already available changes nothing.
    pub fn merge_explicit(&mut self, explicit: &ExplicitRevision) -> Result<MergeOutcome> {
        if explicit.document_id != self.document_id {
            return Err(CoreError::DocumentMismatch {
                rev: explicit.rev.clone(),
                expected: self.document_id.clone(),
                found: explicit.document_id.clone(),
            });
        }

        let ancestry = explicit.ancestry()?;

        // reject before touching anything so a bad revision leaves no stubs
        for (i, id) in ancestry.iter().enumerate() {
            let existing = self.nodes.get(id).and_then(|n| n.parent.as_ref());
            if let (Some(existing), Some(new)) = (existing, ancestry.get(i + 1)) {
                if existing != new {
                    return Err(CoreError::ParentMismatch {
                        rev: id.clone(),
                        existing: existing.clone(),
                        new: new.clone(),
                    });
                }
            }
        }

        let mut outcome = MergeOutcome::default();

        for (i, id) in ancestry.iter().enumerate().rev() {
            let parent = ancestry.get(i + 1).cloned();
            let is_target = i == 0;

            match self.nodes.get_mut(id) {
                None => {
                    self.nodes.insert(
                        id.clone(),
                        RevisionNode {
                            id: id.clone(),
                            document_id: self.document_id.clone(),
                            parent,
                            deleted: is_target && explicit.deleted,
                            available: is_target,
                        },
                    );
                    outcome.tree_changed = true;
                    outcome.body_written |= is_target;
                }
                Some(node) => {
                    if node.parent.is_none() && parent.is_some() {
                        node.parent = parent;
                        outcome.tree_changed = true;
                    }
                    if is_target && !node.available {
                        node.available = true;
                        node.deleted = explicit.deleted;
                        outcome.tree_changed = true;
                        outcome.body_written = true;
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Revisions of this tree that `other` does not fully hold.
    ///
    /// A revision is missing when `other` lacks its id, when this tree holds
    /// its body and `other` only a stub, or when both hold bodies with
    /// different deleted flags. Stubs on both sides compare equal.
    pub fn missing_in(&self, other: Option<&RevisionTree>) -> BTreeSet<RevisionId> {
        self.nodes
            .values()
            .filter(|node| match other.and_then(|t| t.get(&node.id)) {
                None => true,
                Some(theirs) => {
                    node.available && (!theirs.available || theirs.deleted != node.deleted)
                }
            })
            .map(|node| node.id.clone())
            .collect()
    }

    /// Discard the bodies of non-leaf revisions, keeping their ids.
    ///
    /// Returns the revisions turned into stubs.
    pub fn compact(&mut self) -> Vec<RevisionId> {
        let referenced: BTreeSet<RevisionId> = self.referenced().into_iter().cloned().collect();
        let mut compacted = Vec::new();
        for node in self.nodes.values_mut() {
            if node.available && referenced.contains(&node.id) {
                node.available = false;
                compacted.push(node.id.clone());
            }
        }
        compacted
    }
}
