//! Test fixtures and helpers.
//!
//! The document sets of the reference replication suite, built as explicit
//! revisions, and store pairs to replicate them between.

use revsync_core::{DocumentId, ExplicitRevision, RevisionId};
use revsync_store::{MemoryStore, Result, SqliteStore, Store};
use serde_json::json;
use tempfile::TempDir;

/// Backend of a test store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Sqlite,
}

impl StoreKind {
    pub const ALL: [StoreKind; 2] = [StoreKind::Memory, StoreKind::Sqlite];

    /// Every (local, remote) combination.
    pub fn pairs() -> Vec<(StoreKind, StoreKind)> {
        Self::ALL
            .iter()
            .flat_map(|a| Self::ALL.iter().map(move |b| (*a, *b)))
            .collect()
    }
}

/// Two fresh, empty stores. SQLite stores live in a temporary directory
/// removed on drop.
pub struct StorePair {
    pub local: Box<dyn Store>,
    pub remote: Box<dyn Store>,
    _dir: TempDir,
}

impl StorePair {
    pub fn open(local: StoreKind, remote: StoreKind) -> Result<Self> {
        let dir = TempDir::new()?;
        Ok(Self {
            local: open_store(local, "testdb_1", &dir)?,
            remote: open_store(remote, "testdb_2", &dir)?,
            _dir: dir,
        })
    }
}

fn open_store(kind: StoreKind, name: &str, dir: &TempDir) -> Result<Box<dyn Store>> {
    Ok(match kind {
        StoreKind::Memory => Box::new(MemoryStore::named(name)),
        StoreKind::Sqlite => Box::new(SqliteStore::open_named(
            dir.path().join(format!("{name}.db")),
            name,
        )?),
    })
}

/// Build an explicit revision. Panics on malformed ids: fixtures are
/// static and always valid.
pub fn explicit(document_id: &str, rev: &str, history: &[&str]) -> ExplicitRevision {
    ExplicitRevision::parse(document_id, rev, history)
        .expect("fixture revision is valid")
        .body(json!({ "_id": document_id, "rev": rev }))
}

pub fn rev(s: &str) -> RevisionId {
    RevisionId::parse(s).expect("fixture revision id is valid")
}

pub fn doc(s: &str) -> DocumentId {
    DocumentId::from(s)
}

/// `1-a1 <- 2-a2` on `foobar`.
pub fn non_leafs() -> Vec<ExplicitRevision> {
    non_leafs_for("foobar")
}

/// `1-a1 <- 2-a2` on the given document.
pub fn non_leafs_for(document_id: &str) -> Vec<ExplicitRevision> {
    vec![
        explicit(document_id, "2-a2", &["a2", "a1"]),
        explicit(document_id, "1-a1", &["a1"]),
    ]
}

/// A linear chain `1-1 <- 2-2 <- ... <- len-len` on `foobar`, every
/// revision inserted with its full history.
pub fn many_non_leafs(len: usize) -> Vec<ExplicitRevision> {
    (1..=len)
        .map(|generation| {
            let history: Vec<String> = (1..=generation).rev().map(|g| g.to_string()).collect();
            let history: Vec<&str> = history.iter().map(String::as_str).collect();
            explicit("foobar", &format!("{generation}-{generation}"), &history)
        })
        .collect()
}

/// A deleted `3-a3` on top of `1-a1 <- 2-a2`, plus a conflicting `1-b1`.
pub fn conflicting_parents_1() -> Vec<ExplicitRevision> {
    conflicting_parents_1_for("foobar")
}

pub fn conflicting_parents_1_for(document_id: &str) -> Vec<ExplicitRevision> {
    vec![
        explicit(document_id, "3-a3", &["a3", "a2", "a1"]).deleted(true),
        explicit(document_id, "2-a2", &["a2", "a1"]),
        explicit(document_id, "1-a1", &["a1"]),
        explicit(document_id, "1-b1", &["b1"]),
    ]
}

/// Eight revisions over three conflicting branches of `foobar`, with `b1`
/// forking into `2-b2` and `2-bb2`.
pub fn conflicting_parents_2() -> Vec<ExplicitRevision> {
    let mut revisions = conflicting_parents_1();
    revisions.extend([
        explicit("foobar", "2-b2", &["b2", "b1"]),
        explicit("foobar", "2-bb2", &["bb2", "b1"]),
        explicit("foobar", "1-c1", &["c1"]),
        explicit("foobar", "2-c2", &["c2", "c1"]),
    ]);
    revisions
}

/// `conflicting_parents_1` on documents `"1"` through `"{count}"`.
pub fn many_docs_with_conflicts(count: usize) -> Vec<ExplicitRevision> {
    (1..=count)
        .flat_map(|i| conflicting_parents_1_for(&i.to_string()))
        .collect()
}

/// Disjoint seeds for a sync: `foobar` for the local store, `foobaz` for the
/// remote one.
pub fn sync_seeds() -> (Vec<ExplicitRevision>, Vec<ExplicitRevision>) {
    (non_leafs_for("foobar"), non_leafs_for("foobaz"))
}

/// `3-a3` of `foobar` with a two-entry history: its ancestry can never be
/// completed.
pub fn truncated_history() -> Vec<ExplicitRevision> {
    vec![explicit("foobar", "3-a3", &["a3", "a2"])]
}
