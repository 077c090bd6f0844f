//! Property-based tests for tracking invariants.
//!
//! These tests use proptest to verify invariants hold across randomly
//! generated wait graphs, including shapes the dependency builder can
//! never produce (cycles, convergent diamonds) but a partial rebuild
//! after a crash might.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use marcflow_core::{ChunkId, JobId, Priority, SinkId, SubmitterId};
use marcflow_track::service::{DependencyTrackingService, ServiceConfig};
use marcflow_track::store::memory::InMemoryTrackingStore;
use marcflow_track::store::TrackingStore;
use marcflow_track::tracking::DependencyTracking;
use marcflow_track::tracking_key::TrackingKey;

fn key(job: i32, chunk: i32) -> TrackingKey {
    TrackingKey::new(JobId::new(job), ChunkId::new(chunk))
}

fn entry(job: i32, chunk: i32) -> DependencyTracking {
    DependencyTracking::new(key(job, chunk), SinkId::new(0), SubmitterId::new(0))
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime")
        .block_on(future)
}

/// Generates candidate sets whose wait edges only point at earlier
/// entries, the shape the dependency builder produces.
fn arb_candidates() -> impl Strategy<Value = Vec<DependencyTracking>> {
    (2usize..10).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n).prop_map(
            move |matrix| {
                (0..n)
                    .map(|i| {
                        let mut candidate = entry(1, i32::try_from(i).unwrap());
                        let waits: BTreeSet<TrackingKey> = (0..i)
                            .filter(|&j| matrix[i][j])
                            .map(|j| key(1, i32::try_from(j).unwrap()))
                            .collect();
                        candidate.set_waiting_on(waits);
                        candidate
                    })
                    .collect()
            },
        )
    })
}

/// Generates arbitrary wait graphs, cycles included, with priorities.
fn arb_wait_graph() -> impl Strategy<Value = Vec<DependencyTracking>> {
    (2usize..10).prop_flat_map(|n| {
        (
            proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n),
            proptest::collection::vec(1i32..=7, n),
        )
            .prop_map(move |(matrix, priorities)| {
                (0..n)
                    .map(|i| {
                        let job = i32::try_from(i).unwrap();
                        let mut e = entry(job, 0).with_priority(priorities[i]);
                        let waits: BTreeSet<TrackingKey> = (0..n)
                            .filter(|&j| j != i && matrix[i][j])
                            .map(|j| key(i32::try_from(j).unwrap(), 0))
                            .collect();
                        e.set_waiting_on(waits);
                        e
                    })
                    .collect()
            })
    })
}

proptest! {
    /// Reducing an already-reduced candidate set yields the same set.
    #[test]
    fn reduction_is_idempotent(candidates in arb_candidates()) {
        let reduced = DependencyTrackingService::reduce_dependencies(&candidates);
        let survivors: Vec<DependencyTracking> = candidates
            .iter()
            .filter(|c| reduced.contains(&c.key))
            .cloned()
            .collect();
        prop_assert_eq!(
            DependencyTrackingService::reduce_dependencies(&survivors),
            reduced
        );
    }

    /// The frontier is a subset of the candidates and only empty when the
    /// candidate set is.
    #[test]
    fn reduction_keeps_a_nonempty_frontier(candidates in arb_candidates()) {
        let keys: BTreeSet<TrackingKey> = candidates.iter().map(|c| c.key).collect();
        let reduced = DependencyTrackingService::reduce_dependencies(&candidates);
        prop_assert!(reduced.is_subset(&keys));
        // edges only point backwards, so the newest candidate always survives
        prop_assert!(!reduced.is_empty());
    }

    /// Boosting terminates on arbitrary graphs and never lowers a
    /// priority.
    #[test]
    fn boost_is_monotonic_and_terminates(graph in arb_wait_graph()) {
        block_on(async {
            let store = Arc::new(InMemoryTrackingStore::new());
            let service = DependencyTrackingService::new(
                Arc::clone(&store) as Arc<dyn TrackingStore>,
                ServiceConfig::default(),
            );

            let mut before = Vec::new();
            let mut seeds = Vec::new();
            for e in &graph {
                before.push((e.key, e.priority));
                seeds.push(e.key);
                store.put(e.clone()).await.expect("put");
            }

            service
                .boost_priorities(JobId::new(9999), seeds, Priority::High.value())
                .await
                .expect("boost");

            for (k, old) in before {
                let now = service.get(k).await.expect("get").expect("entry").priority;
                assert!(now >= old, "priority of {k} dropped from {old} to {now}");
                assert!(now <= Priority::High.value());
            }
        });
    }
}
