//! # revsync-converge
//!
//! Drives single-pass replication between two stores until they hold
//! identical revision trees: leaves, non-leaf ancestors, deletion markers
//! and conflicting branches alike.
//!
//! A pass copies what the source can surface right now, which for deep or
//! partially replicated trees is not everything. The [`ConvergenceLoop`]
//! alternates passes with revision-level [`compare`]s of fresh
//! [`StoreSnapshot`]s and stops when the stores agree, when a diff repeats
//! (stall), or at a pass ceiling derived from the deepest tree.
//!
//! ## Example
//!
//! ```rust,no_run
//! use revsync_converge::{ConvergenceConfig, FullReplicator};
//! use revsync_store::{MemoryStore, SqliteStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let local = MemoryStore::named("local");
//!     let remote = SqliteStore::open("remote.db")?;
//!
//!     let replicator = FullReplicator::new(ConvergenceConfig::default());
//!     let report = replicator.fully_sync(&local, &remote).await?;
//!     println!("converged after {} passes", report.passes);
//!     Ok(())
//! }
//! ```

pub mod capability;
pub mod compare;
pub mod config;
pub mod convergence;
pub mod driver;
pub mod error;
mod retry;
pub mod snapshot;

pub use capability::{PassReplicator, RevisionSource};
pub use compare::{compare, MissingRevisions, StoreDiff};
pub use config::{ConvergenceConfig, OneWayCompletion, RetryPolicy};
pub use convergence::{ConvergenceLoop, ConvergenceReport, Direction, LoopState};
pub use driver::{FullReplicationExt, FullReplicator};
pub use error::{ConvergenceError, Result};
pub use snapshot::StoreSnapshot;
