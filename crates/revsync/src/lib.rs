//! # revsync
//!
//! Full replication of document revision trees between two stores.
//!
//! ## Overview
//!
//! Ordinary single-pass replication copies the revisions a target is
//! currently missing as far as the source's change feed can tell. Ancestors
//! of conflicting branches and deep non-leaf chains only surface once the
//! target has ingested something that references them, so one pass is not
//! enough. revsync runs passes until a revision-level comparison of both
//! stores finds nothing missing:
//!
//! - **Leaves and non-leaves**: every revision of every tree, not only winners
//! - **Deleted revisions**: deletion markers replicate like any other revision
//! - **Conflicts**: every branch of a conflicted tree
//! - **Compaction**: revisions compacted away before replication stay known
//!   by id only; that loss is accepted, not an error
//!
//! ## Usage
//!
//! ```rust,no_run
//! use revsync::{FullReplicationExt, MemoryStore, SqliteStore, Store};
//!
//! async fn example() -> revsync::Result<()> {
//!     let local = MemoryStore::named("local");
//!     let remote = SqliteStore::open("remote.db")?;
//!
//!     let report = local.fully_replicate_to(&remote).await?;
//!     println!("{} revisions in {} passes", report.revisions_written, report.passes);
//!
//!     // both ways: each store ends with the union of revisions
//!     local.fully_sync(&remote).await?;
//!     assert_eq!(local.info().await?.doc_count, remote.info().await?.doc_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `revsync::core` - revision ids, revision trees, explicit revisions
//! - `revsync::store` - the `Store` trait, memory and SQLite stores, single-pass replication
//! - `revsync::converge` - snapshots, comparator, convergence loop, drivers

pub mod error;

// Re-export component crates
pub use revsync_converge as converge;
pub use revsync_core as core;
pub use revsync_store as store;

pub use error::{Error, Result};

pub use revsync_converge::{
    compare, ConvergenceConfig, ConvergenceError, ConvergenceReport, FullReplicationExt,
    FullReplicator, OneWayCompletion, RetryPolicy, StoreDiff, StoreSnapshot,
};
pub use revsync_core::{DocRevision, DocumentId, ExplicitRevision, RevisionId, RevisionTree};
pub use revsync_store::{MemoryStore, PassOptions, SqliteStore, Store, StoreError, StoreExt};
