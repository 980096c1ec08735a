//! # revsync-testkit
//!
//! Testing utilities for revsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: the explicit-revision documents of the reference
//!   replication scenarios, and store pairs over every backend combination
//! - **Generators**: proptest strategies for revision forests and whole
//!   store contents
//! - **Verification**: `has_all_revs`, reading every (document, revision)
//!   pair from a set of stores, serially or with bounded concurrency
//! - **Fault injection**: [`FlakyStore`], a wrapper failing a scripted number
//!   of calls with a transient error
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use revsync_testkit::fixtures::{self, StoreKind, StorePair};
//! use revsync_store::Store;
//!
//! # async fn example() -> revsync_store::Result<()> {
//! let pair = StorePair::open(StoreKind::Memory, StoreKind::Sqlite)?;
//! pair.local.bulk_insert_explicit(&fixtures::non_leafs()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use revsync_testkit::generators::store_contents;
//!
//! proptest! {
//!     #[test]
//!     fn forests_validate(revisions in store_contents("a", 4, 8)) {
//!         for rev in &revisions {
//!             prop_assert!(rev.validate().is_ok());
//!         }
//!     }
//! }
//! ```

pub mod fixtures;
pub mod flaky;
pub mod generators;
pub mod verify;

pub use fixtures::{StoreKind, StorePair};
pub use flaky::FlakyStore;
pub use generators::{revision_forest, store_contents};
pub use verify::{doc_revs, has_all_revs, DocRevs, Verification};
