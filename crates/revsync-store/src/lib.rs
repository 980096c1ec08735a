//! # revsync store
//!
//! Storage abstraction for revsync: a revision-tracking document store
//! behind the [`Store`] trait, with SQLite and in-memory implementations, and
//! the single-pass replication primitive that copies revisions between any
//! two stores.
//!
//! ## Key Types
//!
//! - [`Store`] - the async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - in-memory storage
//! - [`replicate_once`] - one replication pass, checkpointed on the target
//!
//! ## Usage
//!
//! ```rust,no_run
//! use revsync_store::{replicate_once, MemoryStore, PassOptions, SqliteStore, StoreExt};
//!
//! async fn example() -> revsync_store::Result<()> {
//!     let local = MemoryStore::new();
//!     let remote = SqliteStore::open("replica.db")?;
//!
//!     local
//!         .insert_histories(&[("foobar", "2-a2", &["a2", "a1"])])
//!         .await?;
//!
//!     let report = replicate_once(&local, &remote, &PassOptions::default()).await?;
//!     println!("wrote {} revisions", report.revisions_written);
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent inserts**: inserting a revision the store already holds is a no-op
//! - **Stubs**: ancestors known only by id stay in the tree without a body
//! - **Compaction**: discards non-leaf bodies for good; those revisions can
//!   no longer be read or replicated from the compacted store

pub mod error;
pub mod memory;
pub mod migration;
pub mod replication;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use replication::{replicate_once, replication_id, surfaced_revisions, PassOptions, PassReport};
pub use sqlite::SqliteStore;
pub use traits::{BulkInsertReport, Change, Store, StoreExt, StoreInfo};
