//! The full replication suite, run for every pairing of store backends.
//!
//! Each scenario seeds explicit revision trees, replicates, and then reads
//! every expected revision back from both stores.

use anyhow::Result;
use revsync::{FullReplicationExt, Store, StoreExt};
use revsync_testkit::fixtures::{self, StoreKind, StorePair};
use revsync_testkit::{doc_revs, has_all_revs, Verification};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn open(local: StoreKind, remote: StoreKind) -> Result<StorePair> {
    init_tracing();
    Ok(StorePair::open(local, remote)?)
}

fn stores(pair: &StorePair) -> [&dyn Store; 2] {
    [&*pair.local, &*pair.remote]
}

async fn replicates_empty_dbs(pair: StorePair) -> Result<()> {
    let report = pair.local.fully_replicate_to(&*pair.remote).await?;

    assert_eq!(report.passes, 1);
    assert_eq!(report.revisions_written, 0);
    assert_eq!(pair.local.info().await?.doc_count, 0);
    assert_eq!(pair.remote.info().await?.doc_count, 0);
    Ok(())
}

async fn replicates_non_leafs(pair: StorePair) -> Result<()> {
    let revisions = fixtures::non_leafs();
    pair.local.bulk_insert_explicit(&revisions).await?;

    let report = pair.local.fully_replicate_to(&*pair.remote).await?;

    assert_eq!(report.passes, 2);
    assert_eq!(report.revisions_written, 2);
    assert_eq!(pair.local.info().await?.doc_count, 1);
    assert_eq!(pair.remote.info().await?.doc_count, 1);
    has_all_revs(&stores(&pair), &doc_revs(&revisions), Verification::Serial).await?;
    Ok(())
}

async fn replicates_many_non_leafs(pair: StorePair) -> Result<()> {
    let revisions = fixtures::many_non_leafs(101);
    pair.local.bulk_insert_explicit(&revisions).await?;

    let report = pair.local.fully_replicate_to(&*pair.remote).await?;

    assert_eq!(report.revisions_written, 101);
    let read = has_all_revs(&stores(&pair), &doc_revs(&revisions), Verification::Concurrent(8)).await?;
    assert_eq!(read.len(), 202);
    assert_eq!(pair.remote.info().await?.revision_count, 101);
    Ok(())
}

async fn tolerates_compacted_revisions(pair: StorePair) -> Result<()> {
    let revisions = fixtures::many_non_leafs(101);
    pair.local.bulk_insert_explicit(&revisions).await?;
    assert_eq!(pair.local.compact().await?, 100);

    let report = pair.local.fully_replicate_to(&*pair.remote).await?;
    assert_eq!(report.passes, 1);

    for store in stores(&pair) {
        store.get_rev("foobar", "101-101").await?;
        let err = store
            .get_rev("foobar", "100-100")
            .await
            .expect_err("compacted revision must not be readable");
        assert!(err.is_not_found(), "unexpected error: {err}");
    }
    // the ids themselves still replicate
    assert_eq!(pair.remote.info().await?.revision_count, 101);
    Ok(())
}

async fn replicates_conflicting_parents_1(pair: StorePair) -> Result<()> {
    let revisions = fixtures::conflicting_parents_1();
    pair.local.bulk_insert_explicit(&revisions).await?;

    pair.local.fully_replicate_to(&*pair.remote).await?;

    let read = has_all_revs(&stores(&pair), &doc_revs(&revisions), Verification::Serial).await?;
    assert_eq!(read.len(), 8);
    assert!(read.iter().any(|r| r.rev.as_str() == "3-a3" && r.deleted));
    Ok(())
}

async fn replicates_conflicting_parents_2(pair: StorePair) -> Result<()> {
    let revisions = fixtures::conflicting_parents_2();
    pair.local.bulk_insert_explicit(&revisions).await?;

    pair.local.fully_replicate_to(&*pair.remote).await?;

    has_all_revs(&stores(&pair), &doc_revs(&revisions), Verification::Serial).await?;
    assert_eq!(pair.remote.info().await?.revision_count, 8);
    Ok(())
}

async fn replicates_many_docs_with_conflicts(pair: StorePair) -> Result<()> {
    let revisions = fixtures::many_docs_with_conflicts(10);
    pair.local.bulk_insert_explicit(&revisions).await?;

    let report = pair.local.fully_replicate_to(&*pair.remote).await?;

    assert_eq!(report.documents, 10);
    assert_eq!(report.revisions_written, 40);
    let read = has_all_revs(&stores(&pair), &doc_revs(&revisions), Verification::Concurrent(4)).await?;
    assert_eq!(read.len(), 80);
    Ok(())
}

async fn fully_replicate_from(pair: StorePair) -> Result<()> {
    let revisions = fixtures::non_leafs();
    pair.local.bulk_insert_explicit(&revisions).await?;

    pair.remote.fully_replicate_from(&*pair.local).await?;

    assert_eq!(pair.local.info().await?.doc_count, 1);
    assert_eq!(pair.remote.info().await?.doc_count, 1);
    has_all_revs(&stores(&pair), &doc_revs(&revisions), Verification::Serial).await?;
    Ok(())
}

async fn fully_sync(pair: StorePair) -> Result<()> {
    let (local_seed, remote_seed) = fixtures::sync_seeds();
    pair.local.bulk_insert_explicit(&local_seed).await?;
    pair.remote.bulk_insert_explicit(&remote_seed).await?;

    pair.remote.fully_sync(&*pair.local).await?;

    assert_eq!(pair.local.info().await?.doc_count, 2);
    assert_eq!(pair.remote.info().await?.doc_count, 2);
    let mut expected = doc_revs(&local_seed);
    expected.extend(doc_revs(&remote_seed));
    let read = has_all_revs(&stores(&pair), &expected, Verification::Serial).await?;
    assert_eq!(read.len(), 8);
    Ok(())
}

async fn second_push_writes_nothing(pair: StorePair) -> Result<()> {
    pair.local
        .bulk_insert_explicit(&fixtures::conflicting_parents_2())
        .await?;

    let first = pair.local.fully_replicate_to(&*pair.remote).await?;
    assert_eq!(first.revisions_written, 8);

    let update_seq = pair.remote.info().await?.update_seq;
    let second = pair.local.fully_replicate_to(&*pair.remote).await?;
    assert_eq!(second.passes, 1);
    assert_eq!(second.revisions_written, 0);
    assert_eq!(second.docs_written, 0);
    assert_eq!(pair.remote.info().await?.update_seq, update_seq);
    Ok(())
}

macro_rules! store_pair_suite {
    ($($name:ident => ($local:expr, $remote:expr)),* $(,)?) => {
        $(
            mod $name {
                use super::*;

                #[tokio::test]
                async fn test_replicates_empty_dbs() -> Result<()> {
                    replicates_empty_dbs(open($local, $remote)?).await
                }

                #[tokio::test]
                async fn test_replicates_non_leafs() -> Result<()> {
                    replicates_non_leafs(open($local, $remote)?).await
                }

                #[tokio::test]
                async fn test_replicates_many_non_leafs() -> Result<()> {
                    replicates_many_non_leafs(open($local, $remote)?).await
                }

                #[tokio::test]
                async fn test_tolerates_compacted_revisions() -> Result<()> {
                    tolerates_compacted_revisions(open($local, $remote)?).await
                }

                #[tokio::test]
                async fn test_replicates_conflicting_parents_1() -> Result<()> {
                    replicates_conflicting_parents_1(open($local, $remote)?).await
                }

                #[tokio::test]
                async fn test_replicates_conflicting_parents_2() -> Result<()> {
                    replicates_conflicting_parents_2(open($local, $remote)?).await
                }

                #[tokio::test]
                async fn test_replicates_many_docs_with_conflicts() -> Result<()> {
                    replicates_many_docs_with_conflicts(open($local, $remote)?).await
                }

                #[tokio::test]
                async fn test_fully_replicate_from() -> Result<()> {
                    fully_replicate_from(open($local, $remote)?).await
                }

                #[tokio::test]
                async fn test_fully_sync() -> Result<()> {
                    fully_sync(open($local, $remote)?).await
                }

                #[tokio::test]
                async fn test_second_push_writes_nothing() -> Result<()> {
                    second_push_writes_nothing(open($local, $remote)?).await
                }
            }
        )*
    };
}

store_pair_suite! {
    memory_memory => (StoreKind::Memory, StoreKind::Memory),
    memory_sqlite => (StoreKind::Memory, StoreKind::Sqlite),
    sqlite_memory => (StoreKind::Sqlite, StoreKind::Memory),
    sqlite_sqlite => (StoreKind::Sqlite, StoreKind::Sqlite),
}
