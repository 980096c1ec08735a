//! The convergence loop.
//!
//! A single replication pass does not guarantee full convergence: ancestors
//! are only offered once the target references them, so deep trees need
//! several passes. The loop alternates passes and revision-level diffs until
//! the stores agree, and fails when a diff repeats or the pass ceiling is hit.
//!
//! ```text
//! Replicating(n) --pass ok--> Diffing(n) --equal--------> Converged
//!       ^                         |       --same diff----> Stalled
//!       +------- n + 1 -----------+       --ceiling------> Failed
//! ```
//!
//! The first diff reads every document. A pass only writes revisions the
//! receiving side is missing, so later diffs re-read just the documents the
//! previous diff flagged and keep the rest of the earlier snapshots.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use revsync_core::DocumentId;
use revsync_store::PassReport;

use crate::capability::{PassReplicator, RevisionSource};
use crate::compare::{compare, StoreDiff};
use crate::config::{ConvergenceConfig, OneWayCompletion, RetryPolicy};
use crate::error::{ConvergenceError, Result};
use crate::retry::{with_retry, Exhausted};
use crate::snapshot::StoreSnapshot;

/// Which way revisions flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `a` pushes into `b`.
    OneWay,
    /// Both push into each other on every pass.
    Bidirectional,
}

/// State of a convergence loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// About to run pass number `pass`.
    Replicating { pass: u32 },
    /// Pass `pass` finished, comparing the stores.
    Diffing { pass: u32 },
    Converged,
    Stalled,
    Failed,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Converged | LoopState::Stalled | LoopState::Failed)
    }
}

/// Outcome of a successful full replication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvergenceReport {
    /// Replication passes run.
    pub passes: u32,
    /// Document writes summed over passes and directions.
    pub docs_written: usize,
    /// Revision bodies written, summed over passes and directions.
    pub revisions_written: usize,
    /// Documents held by the target once converged.
    pub documents: usize,
    /// Revisions held by the target once converged, stubs included.
    pub revisions: usize,
}

impl ConvergenceReport {
    fn record(&mut self, pass: &PassReport) {
        self.docs_written += pass.docs_written;
        self.revisions_written += pass.revisions_written;
    }
}

/// Drives replication passes between `a` and `b` until they converge.
pub struct ConvergenceLoop<'a, A: ?Sized, B: ?Sized> {
    a: &'a A,
    b: &'a B,
    direction: Direction,
    config: &'a ConvergenceConfig,
    cancel: CancellationToken,
    state: LoopState,
    report: ConvergenceReport,
    previous: Option<StoreDiff>,
    snapshots: Option<(StoreSnapshot, StoreSnapshot)>,
    ceiling: u32,
    started: Instant,
}

impl<'a, A, B> ConvergenceLoop<'a, A, B>
where
    A: RevisionSource + PassReplicator<B> + ?Sized,
    B: RevisionSource + PassReplicator<A> + ?Sized,
{
    pub fn new(
        a: &'a A,
        b: &'a B,
        direction: Direction,
        config: &'a ConvergenceConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            a,
            b,
            direction,
            config,
            cancel,
            state: LoopState::Replicating { pass: 1 },
            report: ConvergenceReport::default(),
            previous: None,
            snapshots: None,
            ceiling: config.max_passes,
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Pass ceiling in effect; known once the first diff is taken.
    pub fn pass_ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Run the loop to a terminal state.
    ///
    /// Running again starts a fresh loop from the stores' current contents.
    pub async fn run(&mut self) -> Result<ConvergenceReport> {
        self.state = LoopState::Replicating { pass: 1 };
        self.report = ConvergenceReport::default();
        self.previous = None;
        self.snapshots = None;
        self.ceiling = self.config.max_passes.max(1);
        self.started = Instant::now();

        info!(
            a = self.a.replica_name(),
            b = self.b.replica_name(),
            direction = ?self.direction,
            "convergence started"
        );

        // Each pass takes two transitions; the pass ceiling ends the loop
        // well before this bound.
        let budget = self.config.max_passes.max(1).saturating_mul(2).saturating_add(2);
        for _ in 0..budget {
            let next = match self.state {
                LoopState::Replicating { pass } => self.replicate(pass).await,
                LoopState::Diffing { pass } => self.diff(pass).await,
                LoopState::Converged | LoopState::Stalled | LoopState::Failed => break,
            };

            match next {
                Ok(next) => self.transition(next),
                Err(error) => {
                    self.transition(if error.is_stalled() {
                        LoopState::Stalled
                    } else {
                        LoopState::Failed
                    });
                    return Err(error);
                }
            }

            if self.state == LoopState::Converged {
                info!(
                    passes = self.report.passes,
                    revisions_written = self.report.revisions_written,
                    documents = self.report.documents,
                    "stores converged"
                );
                return Ok(self.report.clone());
            }
        }

        self.transition(LoopState::Failed);
        Err(ConvergenceError::PassLimitExceeded {
            limit: self.ceiling,
            diff: self.previous.take().unwrap_or_default(),
        })
    }

    fn transition(&mut self, next: LoopState) {
        trace!(from = ?self.state, to = ?next, "convergence transition");
        self.state = next;
    }

    fn check_interrupted(&self, completed: u32) -> Result<()> {
        if self.cancel.is_cancelled() {
            info!(passes = completed, "convergence cancelled");
            return Err(ConvergenceError::Cancelled { passes: completed });
        }
        if let Some(deadline) = self.config.deadline {
            if self.started.elapsed() >= deadline {
                warn!(passes = completed, ?deadline, "convergence deadline exceeded");
                return Err(ConvergenceError::DeadlineExceeded { passes: completed });
            }
        }
        Ok(())
    }

    async fn replicate(&mut self, pass: u32) -> Result<LoopState> {
        self.check_interrupted(pass - 1)?;

        let (a, b, config) = (self.a, self.b, self.config);
        match self.direction {
            Direction::OneWay => {
                let report = run_pass(a, b, config).await?;
                self.report.record(&report);
            }
            Direction::Bidirectional => {
                let (ab, ba) = tokio::join!(run_pass(a, b, config), run_pass(b, a, config));
                self.report.record(&ab?);
                self.report.record(&ba?);
            }
        }

        self.report.passes = pass;
        debug!(
            pass,
            revisions_written = self.report.revisions_written,
            "replication pass complete"
        );
        Ok(LoopState::Diffing { pass })
    }

    async fn diff(&mut self, pass: u32) -> Result<LoopState> {
        let (a, b) = self.read_snapshots().await?;
        let diff = compare(&a, &b);

        if pass == 1 {
            self.ceiling = self.config.pass_ceiling(a.max_depth().max(b.max_depth()));
            debug!(ceiling = self.ceiling, "pass ceiling set");
        }

        if self.is_complete(&diff) {
            self.report.documents = b.len();
            self.report.revisions = b.revision_count();
            return Ok(LoopState::Converged);
        }
        self.snapshots = Some((a, b));

        if self.previous.as_ref() == Some(&diff) {
            warn!(
                pass,
                missing = diff.missing_count(),
                documents = ?diff.documents(),
                "convergence stalled"
            );
            return Err(ConvergenceError::ConvergenceStalled { passes: pass, diff });
        }

        if pass >= self.ceiling {
            warn!(pass, missing = diff.missing_count(), "pass ceiling reached");
            return Err(ConvergenceError::PassLimitExceeded {
                limit: self.ceiling,
                diff,
            });
        }

        debug!(pass, missing = diff.missing_count(), "stores differ");
        self.previous = Some(diff);
        Ok(LoopState::Replicating { pass: pass + 1 })
    }

    async fn read_snapshots(&mut self) -> Result<(StoreSnapshot, StoreSnapshot)> {
        let config = self.config;
        let retry = &config.retry;
        let (Some((mut a, mut b)), Some(previous)) = (self.snapshots.take(), &self.previous) else {
            let (a, b) = tokio::join!(snapshot(self.a, retry), snapshot(self.b, retry));
            return Ok((a?, b?));
        };

        let ids: Vec<DocumentId> = previous.documents().into_iter().cloned().collect();
        let (fresh_a, fresh_b) = tokio::join!(
            snapshot_docs(self.a, &ids, retry),
            snapshot_docs(self.b, &ids, retry)
        );
        a.refresh(&ids, fresh_a?);
        b.refresh(&ids, fresh_b?);
        trace!(documents = ids.len(), "snapshots refreshed");
        Ok((a, b))
    }

    fn is_complete(&self, diff: &StoreDiff) -> bool {
        match (self.direction, self.config.one_way) {
            (Direction::OneWay, OneWayCompletion::Superset) => diff.b_contains_a(),
            _ => diff.is_equal(),
        }
    }
}

async fn run_pass<S, T>(from: &S, to: &T, config: &ConvergenceConfig) -> Result<PassReport>
where
    S: RevisionSource + PassReplicator<T> + ?Sized,
    T: RevisionSource + ?Sized,
{
    let replication = format!("{}->{}", from.replica_name(), to.replica_name());
    with_retry(&config.retry, &replication, || {
        from.replicate_single_pass(to, &config.pass)
    })
    .await
    .map_err(|Exhausted { error, attempts }| {
        if error.is_transient() {
            ConvergenceError::StoreUnavailable {
                replication,
                attempts,
                source: error,
            }
        } else {
            ConvergenceError::PassFailed {
                replication,
                source: error,
            }
        }
    })
}

async fn snapshot<S>(source: &S, retry: &RetryPolicy) -> Result<StoreSnapshot>
where
    S: RevisionSource + ?Sized,
{
    with_retry(retry, "snapshot", || StoreSnapshot::take(source))
        .await
        .map_err(|Exhausted { error, .. }| ConvergenceError::ConvergenceCheckFailed {
            store: source.replica_name().to_string(),
            source: error,
        })
}

async fn snapshot_docs<S>(source: &S, document_ids: &[DocumentId], retry: &RetryPolicy) -> Result<StoreSnapshot>
where
    S: RevisionSource + ?Sized,
{
    with_retry(retry, "snapshot", || StoreSnapshot::take_docs(source, document_ids))
        .await
        .map_err(|Exhausted { error, .. }| ConvergenceError::ConvergenceCheckFailed {
            store: source.replica_name().to_string(),
            source: error,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use revsync_core::{DocumentId, RevisionTree};
    use revsync_store::{
        replicate_once, MemoryStore, PassOptions, Result as StoreResult, Store, StoreError,
        StoreExt,
    };

    /// A memory-backed replica with injectable failures.
    struct Scripted {
        store: MemoryStore,
        pass_failures: AtomicU32,
        read_failures: AtomicU32,
        full_reads: AtomicU32,
        partial_reads: AtomicU32,
        permanent: bool,
        cancel_after_pass: Option<CancellationToken>,
    }

    impl Scripted {
        fn new(name: &str) -> Self {
            Self {
                store: MemoryStore::named(name),
                pass_failures: AtomicU32::new(0),
                read_failures: AtomicU32::new(0),
                full_reads: AtomicU32::new(0),
                partial_reads: AtomicU32::new(0),
                permanent: false,
                cancel_after_pass: None,
            }
        }

        fn failure(&self) -> StoreError {
            if self.permanent {
                StoreError::Internal("scripted".into())
            } else {
                StoreError::Unavailable("scripted".into())
            }
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[async_trait]
    impl RevisionSource for Scripted {
        fn replica_name(&self) -> &str {
            self.store.name()
        }

        async fn read_all_revisions(&self) -> StoreResult<Vec<RevisionTree>> {
            if take_failure(&self.read_failures) {
                return Err(self.failure());
            }
            self.full_reads.fetch_add(1, Ordering::SeqCst);
            self.store.all_revision_trees().await
        }

        async fn read_revisions(&self, document_ids: &[DocumentId]) -> StoreResult<Vec<RevisionTree>> {
            if take_failure(&self.read_failures) {
                return Err(self.failure());
            }
            self.partial_reads.fetch_add(1, Ordering::SeqCst);
            self.store.read_revisions(document_ids).await
        }
    }

    #[async_trait]
    impl PassReplicator<Scripted> for Scripted {
        async fn replicate_single_pass(
            &self,
            target: &Scripted,
            options: &PassOptions,
        ) -> StoreResult<PassReport> {
            if take_failure(&self.pass_failures) {
                return Err(self.failure());
            }
            let report = replicate_once(&self.store, &target.store, options).await?;
            if let Some(token) = &self.cancel_after_pass {
                token.cancel();
            }
            Ok(report)
        }
    }

    async fn chain(store: &MemoryStore) {
        store
            .insert_histories(&[
                ("foobar", "3-a3", &["a3", "a2", "a1"]),
                ("foobar", "2-a2", &["a2", "a1"]),
                ("foobar", "1-a1", &["a1"]),
            ])
            .await
            .unwrap();
    }

    fn fast() -> ConvergenceConfig {
        ConvergenceConfig::default().with_retry(RetryPolicy::immediate(3))
    }

    #[tokio::test]
    async fn test_chain_converges_in_two_passes() {
        let (source, target) = (MemoryStore::new(), MemoryStore::new());
        chain(&source).await;
        let config = fast();

        let mut lp = ConvergenceLoop::new(&source, &target, Direction::OneWay, &config, CancellationToken::new());
        let report = lp.run().await.unwrap();

        assert_eq!(lp.state(), LoopState::Converged);
        assert_eq!(report.passes, 2);
        assert_eq!(report.revisions_written, 3);
        assert_eq!(report.documents, 1);
        assert_eq!(report.revisions, 3);
        assert_eq!(lp.pass_ceiling(), 8);
        target.get_rev("foobar", "1-a1").await.unwrap();
    }

    #[tokio::test]
    async fn test_later_diffs_read_only_flagged_documents() {
        let source = Scripted::new("source");
        let target = Scripted::new("target");
        chain(&source.store).await;
        source
            .store
            .insert_histories(&[("single", "1-s", &["s"])])
            .await
            .unwrap();
        let config = fast();

        let mut lp = ConvergenceLoop::new(&source, &target, Direction::OneWay, &config, CancellationToken::new());
        let report = lp.run().await.unwrap();

        assert_eq!(report.passes, 2);
        assert_eq!(report.documents, 2);
        assert_eq!(report.revisions, 4);
        for side in [&source, &target] {
            assert_eq!(side.full_reads.load(Ordering::SeqCst), 1);
            assert_eq!(side.partial_reads.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_empty_stores_converge_after_one_pass() {
        let (source, target) = (MemoryStore::new(), MemoryStore::new());
        let config = fast();
        let mut lp = ConvergenceLoop::new(&source, &target, Direction::OneWay, &config, CancellationToken::new());
        let report = lp.run().await.unwrap();
        assert_eq!(report.passes, 1);
        assert_eq!(report.revisions_written, 0);
    }

    #[tokio::test]
    async fn test_truncated_history_stalls() {
        let (source, target) = (MemoryStore::new(), MemoryStore::new());
        source
            .insert_histories(&[("stuck", "3-c", &["c", "b"]), ("fine", "1-x", &["x"])])
            .await
            .unwrap();
        let config = fast();

        let mut lp = ConvergenceLoop::new(&source, &target, Direction::OneWay, &config, CancellationToken::new());
        let err = lp.run().await.unwrap_err();

        assert_eq!(lp.state(), LoopState::Stalled);
        match err {
            ConvergenceError::ConvergenceStalled { passes, diff } => {
                assert_eq!(passes, 2);
                let stuck = &diff.missing_in_b[&DocumentId::from("stuck")];
                assert_eq!(stuck.len(), 2);
                assert!(!diff.missing_in_b.contains_key(&DocumentId::from("fine")));
            }
            other => panic!("expected stall, got {other:?}"),
        }
        target.get_rev("fine", "1-x").await.unwrap();
    }

    #[tokio::test]
    async fn test_pass_ceiling_fails_the_loop() {
        let (source, target) = (MemoryStore::new(), MemoryStore::new());
        chain(&source).await;
        let config = fast().with_max_passes(1);

        let mut lp = ConvergenceLoop::new(&source, &target, Direction::OneWay, &config, CancellationToken::new());
        let err = lp.run().await.unwrap_err();

        assert_eq!(lp.state(), LoopState::Failed);
        assert!(matches!(err, ConvergenceError::PassLimitExceeded { limit: 1, .. }));
        assert_eq!(err.diff().map(StoreDiff::missing_count), Some(2));
    }

    #[tokio::test]
    async fn test_one_way_completion_modes() {
        let (source, target) = (MemoryStore::new(), MemoryStore::new());
        source.insert_histories(&[("a", "1-x", &["x"])]).await.unwrap();
        target.insert_histories(&[("b", "1-y", &["y"])]).await.unwrap();

        let exact = fast();
        let mut lp = ConvergenceLoop::new(&source, &target, Direction::OneWay, &exact, CancellationToken::new());
        assert!(lp.run().await.unwrap_err().is_stalled());

        let superset = fast().with_one_way(OneWayCompletion::Superset);
        let mut lp = ConvergenceLoop::new(&source, &target, Direction::OneWay, &superset, CancellationToken::new());
        let report = lp.run().await.unwrap();
        assert_eq!(report.passes, 1);
        assert_eq!(report.documents, 2);
    }

    #[tokio::test]
    async fn test_bidirectional_reaches_union() {
        let (a, b) = (MemoryStore::named("a"), MemoryStore::named("b"));
        chain(&a).await;
        b.insert_histories(&[("foobar", "1-b1", &["b1"]), ("other", "1-o", &["o"])])
            .await
            .unwrap();
        let config = fast();

        let mut lp = ConvergenceLoop::new(&a, &b, Direction::Bidirectional, &config, CancellationToken::new());
        let report = lp.run().await.unwrap();

        assert_eq!(report.documents, 2);
        assert_eq!(report.revisions, 5);
        let diff = compare(
            &StoreSnapshot::take(&a).await.unwrap(),
            &StoreSnapshot::take(&b).await.unwrap(),
        );
        assert!(diff.is_equal());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_pass() {
        let (source, target) = (MemoryStore::new(), MemoryStore::new());
        chain(&source).await;
        let config = fast();
        let token = CancellationToken::new();
        token.cancel();

        let mut lp = ConvergenceLoop::new(&source, &target, Direction::OneWay, &config, token);
        let err = lp.run().await.unwrap_err();

        assert!(matches!(err, ConvergenceError::Cancelled { passes: 0 }));
        assert_eq!(target.info().await.unwrap().revision_count, 0);
    }

    #[tokio::test]
    async fn test_in_flight_pass_finishes_before_cancellation() {
        let token = CancellationToken::new();
        let mut source = Scripted::new("source");
        source.cancel_after_pass = Some(token.clone());
        let target = Scripted::new("target");
        chain(&source.store).await;
        let config = fast();

        let mut lp = ConvergenceLoop::new(&source, &target, Direction::OneWay, &config, token);
        let err = lp.run().await.unwrap_err();

        assert!(matches!(err, ConvergenceError::Cancelled { passes: 1 }));
        target.store.get_rev("foobar", "3-a3").await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_deadline_expires_immediately() {
        let (source, target) = (MemoryStore::new(), MemoryStore::new());
        let config = fast().with_deadline(Duration::ZERO);
        let mut lp = ConvergenceLoop::new(&source, &target, Direction::OneWay, &config, CancellationToken::new());
        assert!(matches!(
            lp.run().await.unwrap_err(),
            ConvergenceError::DeadlineExceeded { passes: 0 }
        ));
    }

    #[tokio::test]
    async fn test_transient_pass_failures_are_retried() {
        let source = Scripted::new("source");
        source.pass_failures.store(2, Ordering::SeqCst);
        let target = Scripted::new("target");
        chain(&source.store).await;
        let config = fast();

        let mut lp = ConvergenceLoop::new(&source, &target, Direction::OneWay, &config, CancellationToken::new());
        let report = lp.run().await.unwrap();
        assert_eq!(report.passes, 2);
        assert_eq!(source.pass_failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_escalate_to_unavailable() {
        let source = Scripted::new("source");
        source.pass_failures.store(10, Ordering::SeqCst);
        let target = Scripted::new("target");
        let config = fast();

        let mut lp = ConvergenceLoop::new(&source, &target, Direction::OneWay, &config, CancellationToken::new());
        match lp.run().await.unwrap_err() {
            ConvergenceError::StoreUnavailable { replication, attempts, .. } => {
                assert_eq!(replication, "source->target");
                assert_eq!(attempts, 4);
            }
            other => panic!("expected StoreUnavailable, got {other:?}"),
        }
        assert_eq!(lp.state(), LoopState::Failed);
    }

    #[tokio::test]
    async fn test_permanent_pass_failure() {
        let mut source = Scripted::new("source");
        source.permanent = true;
        source.pass_failures.store(1, Ordering::SeqCst);
        let target = Scripted::new("target");
        let config = fast();

        let mut lp = ConvergenceLoop::new(&source, &target, Direction::OneWay, &config, CancellationToken::new());
        assert!(matches!(
            lp.run().await.unwrap_err(),
            ConvergenceError::PassFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_snapshot_failures() {
        let source = Scripted::new("source");
        let target = Scripted::new("target");
        target.read_failures.store(2, Ordering::SeqCst);
        let config = fast();

        // retried and recovered
        let mut lp = ConvergenceLoop::new(&source, &target, Direction::OneWay, &config, CancellationToken::new());
        lp.run().await.unwrap();

        target.read_failures.store(10, Ordering::SeqCst);
        let mut lp = ConvergenceLoop::new(&source, &target, Direction::OneWay, &config, CancellationToken::new());
        match lp.run().await.unwrap_err() {
            ConvergenceError::ConvergenceCheckFailed { store, source } => {
                assert_eq!(store, "target");
                assert!(source.is_transient());
            }
            other => panic!("expected ConvergenceCheckFailed, got {other:?}"),
        }
    }
}
