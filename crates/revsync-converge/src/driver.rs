//! Full replication entry points.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::info;

use revsync_store::Store;

use crate::capability::{PassReplicator, RevisionSource};
use crate::config::ConvergenceConfig;
use crate::convergence::{ConvergenceLoop, ConvergenceReport, Direction};
use crate::error::Result;

/// Runs full replications with a shared configuration and cancellation
/// token.
///
/// Cancelling the token stops every running replication before its next
/// pass; a pass already in flight completes.
#[derive(Debug, Clone, Default)]
pub struct FullReplicator {
    config: ConvergenceConfig,
    cancel: CancellationToken,
}

impl FullReplicator {
    pub fn new(config: ConvergenceConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Replicate `source` into `target` until `target` holds exactly the
    /// same revisions, non-leaf, deleted and conflict revisions included.
    pub async fn fully_replicate_to<S, T>(&self, source: &S, target: &T) -> Result<ConvergenceReport>
    where
        S: RevisionSource + PassReplicator<T> + ?Sized,
        T: RevisionSource + PassReplicator<S> + ?Sized,
    {
        info!(
            source = source.replica_name(),
            target = target.replica_name(),
            "full replication requested"
        );
        let mut convergence =
            ConvergenceLoop::new(source, target, Direction::OneWay, &self.config, self.cancel.clone());
        convergence.run().await
    }

    /// Replicate `source` into `local`; the mirror of
    /// [`fully_replicate_to`](Self::fully_replicate_to).
    pub async fn fully_replicate_from<L, S>(&self, local: &L, source: &S) -> Result<ConvergenceReport>
    where
        L: RevisionSource + PassReplicator<S> + ?Sized,
        S: RevisionSource + PassReplicator<L> + ?Sized,
    {
        self.fully_replicate_to(source, local).await
    }

    /// Replicate both ways until the stores are identical, each holding the
    /// union of their revisions.
    pub async fn fully_sync<L, O>(&self, local: &L, other: &O) -> Result<ConvergenceReport>
    where
        L: RevisionSource + PassReplicator<O> + ?Sized,
        O: RevisionSource + PassReplicator<L> + ?Sized,
    {
        info!(
            local = local.replica_name(),
            other = other.replica_name(),
            "full sync requested"
        );
        let mut convergence = ConvergenceLoop::new(
            local,
            other,
            Direction::Bidirectional,
            &self.config,
            self.cancel.clone(),
        );
        convergence.run().await
    }
}

/// Full replication with the default configuration, available on every
/// store.
pub trait FullReplicationExt: Store {
    /// Push every revision of `self` into `target`.
    fn fully_replicate_to<T>(&self, target: &T) -> impl Future<Output = Result<ConvergenceReport>> + Send
    where
        T: Store + ?Sized;

    /// Pull every revision of `source` into `self`.
    fn fully_replicate_from<T>(&self, source: &T) -> impl Future<Output = Result<ConvergenceReport>> + Send
    where
        T: Store + ?Sized;

    /// Make `self` and `other` identical.
    fn fully_sync<T>(&self, other: &T) -> impl Future<Output = Result<ConvergenceReport>> + Send
    where
        T: Store + ?Sized;
}

impl<S: Store + ?Sized> FullReplicationExt for S {
    async fn fully_replicate_to<T>(&self, target: &T) -> Result<ConvergenceReport>
    where
        T: Store + ?Sized,
    {
        FullReplicator::default().fully_replicate_to(self, target).await
    }

    async fn fully_replicate_from<T>(&self, source: &T) -> Result<ConvergenceReport>
    where
        T: Store + ?Sized,
    {
        FullReplicator::default().fully_replicate_from(self, source).await
    }

    async fn fully_sync<T>(&self, other: &T) -> Result<ConvergenceReport>
    where
        T: Store + ?Sized,
    {
        FullReplicator::default().fully_sync(self, other).await
    }
}
