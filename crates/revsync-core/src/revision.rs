//! Revisions as they travel between stores.
//!
//! An [`ExplicitRevision`] is the unit of bulk insert with caller-chosen
//! revision ids: the revision, its body, and the ids of its ancestors newest
//! first. Replication ships revisions in this same form.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::{DocumentId, RevisionId};

/// A revision with an explicit id and ancestry, inserted without generating
/// new revision ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplicitRevision {
    pub document_id: DocumentId,
    pub rev: RevisionId,
    /// Revision hashes newest first; `history[0]` is `rev`'s own hash and
    /// `history[i]` has generation `rev.generation() - i`.
    pub history: Vec<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl ExplicitRevision {
    /// Create an explicit revision with an empty object body.
    pub fn new(document_id: impl Into<DocumentId>, rev: RevisionId, history: Vec<String>) -> Self {
        Self {
            document_id: document_id.into(),
            rev,
            history,
            deleted: false,
            body: serde_json::Value::Object(Default::default()),
        }
    }

    /// Parse `rev` and `history` from strings, in the `_revisions` shape.
    pub fn parse(document_id: &str, rev: &str, history: &[&str]) -> Result<Self> {
        let explicit = Self::new(
            document_id,
            RevisionId::parse(rev)?,
            history.iter().map(|h| h.to_string()).collect(),
        );
        explicit.validate()?;
        Ok(explicit)
    }

    /// Mark this revision as a deletion marker.
    pub fn deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    /// Check the history against the revision id.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| CoreError::InvalidHistory {
            rev: self.rev.clone(),
            reason: reason.to_string(),
        };

        match self.history.first() {
            None => return Err(invalid("history is empty")),
            Some(head) if head != self.rev.hash() => {
                return Err(invalid("history does not start with the revision's hash"))
            }
            Some(_) => {}
        }
        if self.history.len() as u64 > self.rev.generation() {
            return Err(invalid("history is longer than the revision's generation"));
        }
        Ok(())
    }

    /// The revision followed by its ancestors, newest first.
    pub fn ancestry(&self) -> Result<Vec<RevisionId>> {
        self.validate()?;
        let start = self.rev.generation();
        self.history
            .iter()
            .enumerate()
            .map(|(i, hash)| RevisionId::from_parts(start - i as u64, hash))
            .collect()
    }

    /// The immediate parent according to the history, if listed.
    pub fn parent(&self) -> Result<Option<RevisionId>> {
        Ok(self.ancestry()?.into_iter().nth(1))
    }
}

/// A revision read back from a store with its body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocRevision {
    pub document_id: DocumentId,
    pub rev: RevisionId,
    pub deleted: bool,
    pub body: serde_json::Value,
}
