//! # revsync core
//!
//! The data model shared by every revsync crate: documents, revisions and the
//! revision trees that record a document's full history.
//!
//! This crate performs no I/O.
//!
//! ## Key Types
//!
//! - [`DocumentId`] - opaque document identifier
//! - [`RevisionId`] - `<generation>-<hash>` revision identifier
//! - [`RevisionTree`] - every known revision of a document, leaves,
//!   ancestors, deletion markers and conflicting branches alike
//! - [`ExplicitRevision`] - a revision with caller-chosen id and ancestry, the
//!   unit of explicit bulk insert and of replication

pub mod error;
pub mod revision;
pub mod tree;
pub mod types;

pub use error::{CoreError, Result};
pub use revision::{DocRevision, ExplicitRevision};
pub use tree::{MergeOutcome, RevisionNode, RevisionTree, TreeSummary};
pub use types::{DocumentId, RevisionId};
