//! SQLite implementation of the Store trait.
//!
//! The durable backend. Uses rusqlite with bundled SQLite; every call runs
//! on tokio's blocking pool so the async runtime never waits on disk.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use revsync_core::{DocumentId, ExplicitRevision, RevisionId, RevisionNode, RevisionTree};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{anonymous_name, BulkInsertReport, Change, Store, StoreInfo};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking.
pub struct SqliteStore {
    name: String,
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path, named after the path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let name = path.as_ref().display().to_string();
        Self::open_named(path, name)
    }

    /// Open a SQLite database at the given path under an explicit store name.
    pub fn open_named(path: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            name: name.into(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            name: anonymous_name("sqlite-memory"),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Internal(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("blocking task failed: {}", e)))?
    }
}

// Helper to convert a row to a RevisionNode
fn row_to_node(
    document_id: &DocumentId,
    rev: String,
    parent: Option<String>,
    deleted: bool,
    available: bool,
) -> Result<RevisionNode> {
    Ok(RevisionNode {
        id: RevisionId::parse(&rev)?,
        document_id: document_id.clone(),
        parent: parent.as_deref().map(RevisionId::parse).transpose()?,
        deleted,
        available,
    })
}

fn load_tree(conn: &Connection, document_id: &DocumentId) -> Result<Option<RevisionTree>> {
    let mut stmt = conn.prepare_cached(
        "SELECT rev, parent, deleted, available FROM revisions WHERE doc_id = ?1",
    )?;
    let rows = stmt.query_map(params![document_id.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, bool>(2)?,
            row.get::<_, bool>(3)?,
        ))
    })?;

    let mut nodes = Vec::new();
    for row in rows {
        let (rev, parent, deleted, available) = row?;
        nodes.push(row_to_node(document_id, rev, parent, deleted, available)?);
    }

    if nodes.is_empty() {
        return Ok(None);
    }
    Ok(Some(RevisionTree::from_nodes(document_id.clone(), nodes)?))
}

fn load_all_trees(conn: &Connection) -> Result<Vec<RevisionTree>> {
    let mut stmt = conn.prepare_cached(
        "SELECT doc_id, rev, parent, deleted, available FROM revisions ORDER BY doc_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, bool>(3)?,
            row.get::<_, bool>(4)?,
        ))
    })?;

    let mut grouped: BTreeMap<DocumentId, Vec<RevisionNode>> = BTreeMap::new();
    for row in rows {
        let (doc_id, rev, parent, deleted, available) = row?;
        let document_id = DocumentId::from(doc_id);
        let node = row_to_node(&document_id, rev, parent, deleted, available)?;
        grouped.entry(document_id).or_default().push(node);
    }

    grouped
        .into_iter()
        .map(|(document_id, nodes)| Ok(RevisionTree::from_nodes(document_id, nodes)?))
        .collect()
}

fn read_update_seq(conn: &Connection) -> Result<u64> {
    let seq: i64 = conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'update_seq'",
        [],
        |row| row.get(0),
    )?;
    Ok(seq as u64)
}

fn upsert_node(conn: &Connection, node: &RevisionNode) -> Result<()> {
    conn.execute(
        "INSERT INTO revisions (doc_id, rev, generation, parent, deleted, available)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(doc_id, rev) DO UPDATE SET
            parent = excluded.parent,
            deleted = excluded.deleted,
            available = excluded.available",
        params![
            node.document_id.as_str(),
            node.id.as_str(),
            node.id.generation() as i64,
            node.parent.as_ref().map(RevisionId::as_str),
            node.deleted,
            node.available,
        ],
    )?;
    Ok(())
}

/// A document's tree before and after a batch, plus the bodies to write.
struct StagedDocument {
    before: Option<RevisionTree>,
    after: RevisionTree,
    bodies: Vec<(RevisionId, serde_json::Value)>,
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn bulk_insert_explicit(&self, revisions: &[ExplicitRevision]) -> Result<BulkInsertReport> {
        let revisions = revisions.to_vec();

        self.call(move |conn| {
            let tx = conn.transaction()?;
            let mut report = BulkInsertReport::default();

            // Stage every tree first so an invalid revision aborts the batch
            let mut staged: BTreeMap<DocumentId, StagedDocument> = BTreeMap::new();
            for explicit in &revisions {
                let doc = match staged.entry(explicit.document_id.clone()) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let before = load_tree(&tx, &explicit.document_id)?;
                        let after = before
                            .clone()
                            .unwrap_or_else(|| RevisionTree::new(explicit.document_id.clone()));
                        entry.insert(StagedDocument {
                            before,
                            after,
                            bodies: Vec::new(),
                        })
                    }
                };

                let outcome = doc.after.merge_explicit(explicit)?;
                if outcome.body_written {
                    doc.bodies.push((explicit.rev.clone(), explicit.body.clone()));
                    report.revisions_written += 1;
                }
            }

            let mut update_seq = read_update_seq(&tx)?;
            for (document_id, doc) in staged {
                if doc.before.as_ref() == Some(&doc.after) {
                    continue;
                }

                for node in doc.after.nodes() {
                    let unchanged = doc
                        .before
                        .as_ref()
                        .and_then(|tree| tree.get(&node.id))
                        .is_some_and(|old| old == node);
                    if !unchanged {
                        upsert_node(&tx, node)?;
                    }
                }

                for (rev, body) in &doc.bodies {
                    tx.execute(
                        "UPDATE revisions SET body = ?3 WHERE doc_id = ?1 AND rev = ?2",
                        params![document_id.as_str(), rev.as_str(), serde_json::to_string(body)?],
                    )?;
                }

                update_seq += 1;
                tx.execute(
                    "INSERT INTO documents (doc_id, seq) VALUES (?1, ?2)
                     ON CONFLICT(doc_id) DO UPDATE SET seq = excluded.seq",
                    params![document_id.as_str(), update_seq as i64],
                )?;
                report.documents_changed += 1;
            }

            tx.execute(
                "UPDATE store_meta SET value = ?1 WHERE key = 'update_seq'",
                params![update_seq as i64],
            )?;
            tx.commit()?;

            Ok(report)
        })
        .await
    }

    async fn compact(&self) -> Result<usize> {
        let discarded = self
            .call(|conn| {
                let tx = conn.transaction()?;
                let mut discarded = 0;

                for mut tree in load_all_trees(&tx)? {
                    for rev in tree.compact() {
                        tx.execute(
                            "UPDATE revisions SET available = 0, body = NULL
                             WHERE doc_id = ?1 AND rev = ?2",
                            params![tree.document_id().as_str(), rev.as_str()],
                        )?;
                        discarded += 1;
                    }
                }
                if discarded > 0 {
                    tx.execute("DELETE FROM checkpoints", [])?;
                }

                tx.commit()?;
                Ok(discarded)
            })
            .await?;

        tracing::debug!(store = %self.name, discarded, "compacted");
        Ok(discarded)
    }

    async fn revision_tree(&self, document_id: &DocumentId) -> Result<Option<RevisionTree>> {
        let document_id = document_id.clone();
        self.call(move |conn| load_tree(conn, &document_id)).await
    }

    async fn all_revision_trees(&self) -> Result<Vec<RevisionTree>> {
        self.call(|conn| load_all_trees(conn)).await
    }

    async fn revision_body(
        &self,
        document_id: &DocumentId,
        rev: &RevisionId,
    ) -> Result<Option<serde_json::Value>> {
        let document_id = document_id.clone();
        let rev = rev.clone();

        self.call(move |conn| {
            let body: Option<Option<String>> = conn
                .query_row(
                    "SELECT body FROM revisions
                     WHERE doc_id = ?1 AND rev = ?2 AND available = 1",
                    params![document_id.as_str(), rev.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            match body.flatten() {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn changes_since(&self, since: u64, limit: usize) -> Result<Vec<Change>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT doc_id, seq FROM documents WHERE seq > ?1 ORDER BY seq LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![since as i64, limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(rows
                .into_iter()
                .map(|(doc_id, seq)| Change {
                    seq: seq as u64,
                    document_id: DocumentId::from(doc_id),
                })
                .collect())
        })
        .await
    }

    async fn info(&self) -> Result<StoreInfo> {
        let name = self.name.clone();

        self.call(move |conn| {
            let trees = load_all_trees(conn)?;
            let (revision_count, available): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(available), 0) FROM revisions",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            Ok(StoreInfo {
                name,
                doc_count: trees
                    .iter()
                    .filter(|tree| tree.winner().is_some_and(|w| !w.deleted))
                    .count(),
                update_seq: read_update_seq(conn)?,
                revision_count: revision_count as usize,
                available_revisions: available as usize,
            })
        })
        .await
    }

    async fn checkpoint(&self, replication_id: &str) -> Result<Option<u64>> {
        let replication_id = replication_id.to_string();

        self.call(move |conn| {
            let seq: Option<i64> = conn
                .query_row(
                    "SELECT last_seq FROM checkpoints WHERE replication_id = ?1",
                    params![replication_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(seq.map(|s| s as u64))
        })
        .await
    }

    async fn set_checkpoint(&self, replication_id: &str, seq: u64) -> Result<()> {
        let replication_id = replication_id.to_string();

        self.call(move |conn| {
            conn.execute(
                "INSERT INTO checkpoints (replication_id, last_seq, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(replication_id) DO UPDATE SET
                    last_seq = excluded.last_seq,
                    updated_at = excluded.updated_at",
                params![replication_id, seq as i64, now_millis()],
            )?;
            Ok(())
        })
        .await
    }
}
