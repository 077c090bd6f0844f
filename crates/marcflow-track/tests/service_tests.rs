//! Integration tests for the dependency tracking service.
//!
//! The wait-set topology used here exercises overlapping match keys across
//! two jobs plus two isolated outliers on other sink/submitter scopes, so
//! frontier reduction, index maintenance and cross-scope isolation are all
//! covered by the same fixture.

use std::collections::BTreeSet;
use std::sync::Arc;

use marcflow_core::{ChunkId, JobId, Priority, SinkId, SubmitterId};
use marcflow_track::error::Result;
use marcflow_track::service::{DependencyTrackingService, ServiceConfig};
use marcflow_track::store::memory::InMemoryTrackingStore;
use marcflow_track::store::TrackingStore;
use marcflow_track::tracking::{CapacityConfig, ChunkSchedulingStatus, DependencyTracking};
use marcflow_track::tracking_key::TrackingKey;

fn key(job: i32, chunk: i32) -> TrackingKey {
    TrackingKey::new(JobId::new(job), ChunkId::new(chunk))
}

fn tracker(job: i32, chunk: i32, keys: &[&str]) -> DependencyTracking {
    scoped_tracker(job, chunk, 0, 0, keys)
}

fn scoped_tracker(
    job: i32,
    chunk: i32,
    sink: i32,
    submitter: i32,
    keys: &[&str],
) -> DependencyTracking {
    DependencyTracking::new(key(job, chunk), SinkId::new(sink), SubmitterId::new(submitter))
        .with_match_keys(keys.iter().map(ToString::to_string))
}

fn service() -> DependencyTrackingService {
    service_with(ServiceConfig::default())
}

fn service_with(config: ServiceConfig) -> DependencyTrackingService {
    DependencyTrackingService::new(Arc::new(InMemoryTrackingStore::new()), config)
}

/// The shared fixture: `(entry, expected wait set)` in insertion order.
fn fixture() -> Vec<(DependencyTracking, BTreeSet<TrackingKey>)> {
    vec![
        // isolated outliers on other scopes
        (scoped_tracker(0, 1, 1, 0, &["K1"]), BTreeSet::new()),
        (scoped_tracker(0, 2, 0, 1, &["K2"]), BTreeSet::new()),
        // job 1
        (tracker(1, 1, &["K1", "K3"]), BTreeSet::new()),
        (tracker(1, 2, &["K2"]), BTreeSet::new()),
        (tracker(1, 3, &[]), BTreeSet::new()),
        // job 2, chaining through job 1
        (tracker(2, 1, &["K1", "K2"]), [key(1, 1), key(1, 2)].into()),
        (tracker(2, 2, &["K1"]), [key(2, 1)].into()),
        (tracker(2, 3, &["K2"]), [key(2, 1)].into()),
        (tracker(2, 4, &["K3"]), [key(1, 1)].into()),
        (
            tracker(2, 5, &["K1", "K2", "K3"]),
            [key(2, 2), key(2, 3), key(2, 4)].into(),
        ),
    ]
}

async fn populate(service: &DependencyTrackingService) -> Result<()> {
    for (entry, _) in fixture() {
        service.add_and_build_dependencies(entry, None).await?;
    }
    Ok(())
}

#[tokio::test]
async fn wait_sets_follow_last_producers() -> Result<()> {
    let service = service();
    populate(&service).await?;

    for (entry, expected) in fixture() {
        let stored = service.get(entry.key).await?.unwrap();
        assert_eq!(
            stored.waiting_on, expected,
            "tracker {} should wait for the expected keys",
            entry.key
        );
    }
    Ok(())
}

#[tokio::test]
async fn full_scan_fallback_builds_identical_wait_sets() -> Result<()> {
    let service = service_with(ServiceConfig::default().with_producer_index(false));
    populate(&service).await?;

    for (entry, expected) in fixture() {
        let stored = service.get(entry.key).await?.unwrap();
        assert_eq!(
            stored.waiting_on, expected,
            "tracker {} should wait for the expected keys without the index",
            entry.key
        );
    }
    Ok(())
}

#[tokio::test]
async fn completions_release_waiters_in_order() -> Result<()> {
    let service = service();
    populate(&service).await?;

    service.remove(key(1, 1)).await?;
    service.remove_from_waiting_on(key(1, 1)).await?;
    assert!(
        service.get(key(2, 4)).await?.unwrap().waiting_on.is_empty(),
        "when 1/1 completes, 2/4 should have an empty wait set"
    );

    service.remove(key(1, 2)).await?;
    service.remove_from_waiting_on(key(1, 2)).await?;
    assert!(
        service.get(key(2, 1)).await?.unwrap().waiting_on.is_empty(),
        "when 1/1 and 1/2 complete, 2/1 should have an empty wait set"
    );
    Ok(())
}

#[tokio::test]
async fn removal_drops_producer_index_references() -> Result<()> {
    let service = service();
    populate(&service).await?;

    service.remove(key(2, 5)).await?;
    let index = service.producer_index_snapshot().await?;
    assert!(
        index
            .keys()
            .all(|wf| !(wf.sink_id == SinkId::new(0) && wf.submitter == SubmitterId::new(0))),
        "removing the last producer must clear its index entries"
    );
    Ok(())
}

#[tokio::test]
async fn barrier_key_chains_chunks_of_a_job() -> Result<()> {
    let service = service();
    let chunks = [
        tracker(1, 1, &["K1", "K3"]),
        tracker(1, 2, &["K2"]),
        tracker(1, 3, &[]),
    ];
    for entry in chunks {
        service.add_and_build_dependencies(entry, Some("hest")).await?;
    }

    assert!(service.get(key(1, 1)).await?.unwrap().waiting_on.is_empty());
    assert_eq!(
        service.get(key(1, 2)).await?.unwrap().waiting_on,
        [key(1, 1)].into()
    );
    assert_eq!(
        service.get(key(1, 3)).await?.unwrap().waiting_on,
        [key(1, 2)].into()
    );
    Ok(())
}

#[tokio::test]
async fn barrier_chains_even_keyless_chunks() -> Result<()> {
    let service = service();
    for (entry, _) in fixture() {
        service.add_and_build_dependencies(entry, Some("hest")).await?;
    }
    // with the barrier every chunk of the scope chains, unlike the
    // barrier-free fixture where 1/3 floats free
    let floating = service.get(key(1, 3)).await?.unwrap();
    assert!(!floating.waiting_on.is_empty());
    Ok(())
}

#[tokio::test]
async fn rebuilt_index_matches_evolved_index() -> Result<()> {
    let service = service();
    populate(&service).await?;

    let evolved = service.producer_index_snapshot().await?;
    let rebuilt = service.rebuild_producer_index().await?;
    assert_eq!(
        evolved, rebuilt,
        "a rebuilt index must be identical to one that developed over time"
    );
    Ok(())
}

#[tokio::test]
async fn ordered_pair_blocks_then_releases() -> Result<()> {
    // two chunks of one job share a match key: the second must never run
    // while the first is live
    let service = service();
    let first = service
        .add_and_build_dependencies(
            scoped_tracker(1, 1, 5, 0, &["X"]),
            None,
        )
        .await?;
    let second = service
        .add_and_build_dependencies(
            scoped_tracker(1, 2, 5, 0, &["X"]),
            None,
        )
        .await?;

    let blocked = service.get(second).await?.unwrap();
    assert_eq!(blocked.status, ChunkSchedulingStatus::Blocked);
    assert_eq!(blocked.waiting_on, [first].into());

    service.remove(first).await?;
    let released = service.remove_from_waiting_on(first).await?;
    assert_eq!(released, [second].into());

    let unblocked = service.get(second).await?.unwrap();
    assert_eq!(unblocked.status, ChunkSchedulingStatus::QueuedForProcessing);
    assert!(unblocked.waiting_on.is_empty());
    Ok(())
}

#[tokio::test]
async fn chain_waits_only_on_frontier() -> Result<()> {
    // a -X- b -Y- c: c waits for b alone, not for a as well
    let service = service();
    service
        .add_and_build_dependencies(scoped_tracker(1, 1, 5, 0, &["X"]), None)
        .await?;
    let b = service
        .add_and_build_dependencies(scoped_tracker(1, 2, 5, 0, &["X", "Y"]), None)
        .await?;
    let c = service
        .add_and_build_dependencies(scoped_tracker(1, 3, 5, 0, &["Y"]), None)
        .await?;

    assert_eq!(service.get(c).await?.unwrap().waiting_on, [b].into());
    Ok(())
}

#[tokio::test]
async fn capacity_counts_down_and_never_goes_negative() -> Result<()> {
    let service =
        service_with(ServiceConfig::default().with_capacities(CapacityConfig::uniform(2)));
    let sink = SinkId::new(5);
    for chunk in 1..=3 {
        service.add(scoped_tracker(1, chunk, 5, 0, &[])).await?;
    }

    let status = ChunkSchedulingStatus::QueuedForProcessing;
    assert_eq!(service.capacity(sink, status)?, 2);

    assert!(service.set_validated_status(key(1, 1), status).await?);
    assert_eq!(service.capacity(sink, status)?, 1);

    assert!(service.set_validated_status(key(1, 2), status).await?);
    assert_eq!(service.capacity(sink, status)?, 0);

    // a third admission would overshoot; capacity must clamp at zero
    assert!(service.set_validated_status(key(1, 3), status).await?);
    assert_eq!(service.capacity(sink, status)?, 0);
    Ok(())
}

#[tokio::test]
async fn aborted_job_unblocks_cross_job_waiters_via_recheck() -> Result<()> {
    let service = service();
    service
        .add_and_build_dependencies(scoped_tracker(1, 1, 5, 0, &["X"]), None)
        .await?;
    let dependent = service
        .add_and_build_dependencies(scoped_tracker(2, 1, 5, 0, &["X"]), None)
        .await?;

    service.remove_job(JobId::new(1)).await?;
    // the dangling reference survives until the recheck pass
    assert!(!service.get(dependent).await?.unwrap().waiting_on.is_empty());

    let released = service.recheck_blocks().await?;
    assert_eq!(released, [dependent].into());
    assert_eq!(
        service.get(dependent).await?.unwrap().status,
        ChunkSchedulingStatus::QueuedForProcessing
    );
    Ok(())
}

#[tokio::test]
async fn no_dangling_references_after_mixed_churn() -> Result<()> {
    let service = service();
    populate(&service).await?;

    service.remove_job(JobId::new(1)).await?;
    service.remove(key(2, 1)).await?;
    service.remove_from_waiting_on(key(2, 1)).await?;
    service.recheck_blocks().await?;

    let live = service.job_ids().await?;
    for job in live {
        for entry in service.snapshot(job).await? {
            for blocker in &entry.waiting_on {
                assert!(
                    service.is_scheduled(*blocker).await?,
                    "entry {} references dead blocker {}",
                    entry.key,
                    blocker
                );
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn recount_matches_map_content() -> Result<()> {
    let store = Arc::new(InMemoryTrackingStore::new());
    let service = DependencyTrackingService::new(
        Arc::clone(&store) as Arc<dyn TrackingStore>,
        ServiceConfig::default(),
    );
    populate(&service).await?;
    service
        .set_status(key(1, 1), ChunkSchedulingStatus::QueuedForProcessing)
        .await?;
    service
        .set_status(key(1, 2), ChunkSchedulingStatus::Processing)
        .await?;

    service.recount_sink_status(&BTreeSet::new()).await?;

    let counters = service.counters_for_sinks()?;
    let truth = store.status_counts(None).await?;
    for (sink, histogram) in truth {
        for (status, count) in histogram {
            assert_eq!(
                counters[&sink].count(status),
                count,
                "counter for sink {sink} status {status} diverges from map truth"
            );
        }
    }
    Ok(())
}

#[tokio::test]
async fn recount_repairs_deliberate_drift() -> Result<()> {
    let store = Arc::new(InMemoryTrackingStore::new());
    let service = DependencyTrackingService::new(
        Arc::clone(&store) as Arc<dyn TrackingStore>,
        ServiceConfig::default(),
    );
    populate(&service).await?;
    let sink = SinkId::new(0);

    // fabricate drift: mutate the store behind the service's back, the way
    // a crashed node loses its counter delta
    store
        .transition(&key(1, 3), ChunkSchedulingStatus::Processing)
        .await?;
    assert_eq!(service.count(sink, ChunkSchedulingStatus::Processing)?, 0);

    service.recount_sink_status(&[sink].into()).await?;
    assert_eq!(
        service.count(sink, ChunkSchedulingStatus::Processing)?,
        1,
        "recount must converge counters to map truth"
    );
    Ok(())
}

#[tokio::test]
async fn priority_boost_cascades_across_jobs() -> Result<()> {
    let service = service();
    // low-priority chain in job 1
    service
        .add_and_build_dependencies(
            scoped_tracker(1, 1, 5, 0, &["X"]).with_priority(Priority::Low.value()),
            None,
        )
        .await?;
    service
        .add_and_build_dependencies(
            scoped_tracker(1, 2, 5, 0, &["X", "Y"]).with_priority(Priority::Low.value()),
            None,
        )
        .await?;

    // high-priority chunk of job 2 arrives behind the chain
    service
        .add_and_build_dependencies(
            scoped_tracker(2, 1, 5, 0, &["Y"]).with_priority(Priority::High.value()),
            None,
        )
        .await?;

    // the whole upstream chain is boosted, transitively
    assert_eq!(
        service.get(key(1, 2)).await?.unwrap().priority,
        Priority::High.value()
    );
    assert_eq!(
        service.get(key(1, 1)).await?.unwrap().priority,
        Priority::High.value()
    );
    Ok(())
}

#[tokio::test]
async fn boost_terminates_on_cyclic_wait_graphs() -> Result<()> {
    let store = Arc::new(InMemoryTrackingStore::new());
    let service = DependencyTrackingService::new(
        Arc::clone(&store) as Arc<dyn TrackingStore>,
        ServiceConfig::default(),
    );

    // wire a cycle directly through the store; the builder can never
    // produce one, but a crashed rebuild might
    let mut a = scoped_tracker(1, 1, 5, 0, &[]).with_priority(Priority::Low.value());
    let mut b = scoped_tracker(2, 1, 5, 0, &[]).with_priority(Priority::Low.value());
    a.set_waiting_on([key(2, 1)].into());
    b.set_waiting_on([key(1, 1)].into());
    store.put(a).await?;
    store.put(b).await?;

    service
        .boost_priorities(JobId::new(99), [key(1, 1)], Priority::High.value())
        .await?;

    assert_eq!(
        service.get(key(1, 1)).await?.unwrap().priority,
        Priority::High.value()
    );
    assert_eq!(
        service.get(key(2, 1)).await?.unwrap().priority,
        Priority::High.value()
    );
    Ok(())
}

#[tokio::test]
async fn stale_entries_are_found_and_resent() -> Result<()> {
    let store = Arc::new(InMemoryTrackingStore::new());
    let service = DependencyTrackingService::new(
        Arc::clone(&store) as Arc<dyn TrackingStore>,
        ServiceConfig::default(),
    );

    let mut stuck = scoped_tracker(1, 1, 5, 0, &[])
        .with_status(ChunkSchedulingStatus::Processing);
    stuck.last_modified = chrono::Utc::now() - chrono::Duration::hours(3);
    store.put(stuck).await?;

    let stale = service
        .stale(ChunkSchedulingStatus::Processing, std::time::Duration::from_secs(3600))
        .await?;
    assert_eq!(stale.len(), 1);

    service
        .modify(
            key(1, 1),
            Box::new(|entry: &mut DependencyTracking| {
                entry.resend();
            }),
        )
        .await?;

    let resent = service.get(key(1, 1)).await?.unwrap();
    assert_eq!(resent.status, ChunkSchedulingStatus::QueuedForProcessing);
    assert_eq!(resent.retries, 1);
    // the resend stamped the entry, so it is no longer stale
    assert!(service
        .stale(ChunkSchedulingStatus::QueuedForProcessing, std::time::Duration::from_secs(3600))
        .await?
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn reset_status_moves_only_named_jobs() -> Result<()> {
    let service = service();
    for chunk in 1..=2 {
        service
            .add(
                scoped_tracker(1, chunk, 5, 0, &[])
                    .with_status(ChunkSchedulingStatus::QueuedForProcessing),
            )
            .await?;
    }
    service
        .add(
            scoped_tracker(2, 1, 5, 0, &[])
                .with_status(ChunkSchedulingStatus::QueuedForProcessing),
        )
        .await?;

    let moved = service
        .reset_status(
            ChunkSchedulingStatus::QueuedForProcessing,
            ChunkSchedulingStatus::ReadyForProcessing,
            &[JobId::new(1)],
        )
        .await?;
    assert_eq!(moved, 2);
    assert_eq!(
        service.get(key(2, 1)).await?.unwrap().status,
        ChunkSchedulingStatus::QueuedForProcessing
    );
    Ok(())
}

#[tokio::test]
async fn drains_whole_fixture_through_completion() -> Result<()> {
    // release chunks sink by sink until the store is empty; the producer
    // index must drain with it
    let service = service();
    populate(&service).await?;
    for (entry, _) in fixture() {
        service
            .set_status(entry.key, ChunkSchedulingStatus::QueuedForDelivery)
            .await?;
    }

    let mut sinks = service
        .active_sinks(ChunkSchedulingStatus::QueuedForDelivery)
        .await?;
    while !sinks.is_empty() {
        for sink in &sinks {
            let keys = service
                .find(ChunkSchedulingStatus::QueuedForDelivery, Some(*sink), None)
                .await?;
            assert!(!keys.is_empty(), "active sink must yield removable keys");
            for k in keys {
                service.remove(k).await?;
                service.remove_from_waiting_on(k).await?;
            }
        }
        sinks = service
            .active_sinks(ChunkSchedulingStatus::QueuedForDelivery)
            .await?;
    }

    assert!(service.producer_index_snapshot().await?.is_empty());
    assert_eq!(service.job_ids().await?.len(), 0);
    Ok(())
}
