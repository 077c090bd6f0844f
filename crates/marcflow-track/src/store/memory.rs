//! In-memory tracking store.
//!
//! This module provides [`InMemoryTrackingStore`], the single-node
//! implementation of the [`TrackingStore`] trait: a mutex-guarded map with
//! atomic per-key transforms. It backs tests and single-process
//! deployments.
//!
//! ## Limitations
//!
//! - **Single-process only**: State is not shared across process boundaries
//! - **No persistence**: All state is lost when the process exits; the
//!   partition-time records in the job store remain the recovery source

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;

use marcflow_core::{JobId, SinkId, SubmitterId};

use super::{
    EntryLease, EntryMutator, JobOccupancy, StatusCounts, TrackingStore, TransitionOutcome,
};
use crate::error::{Error, Result};
use crate::tracking::{ChunkSchedulingStatus, DependencyTracking, StatusChange};
use crate::tracking_key::{TrackingKey, WaitFor};

/// In-memory tracking store.
///
/// Thread-safe via `RwLock`; per-key leases are handed out from a lock
/// registry of async mutexes so `modify` callers contending for the same
/// key wait on each other without blocking unrelated keys.
#[derive(Debug, Default)]
pub struct InMemoryTrackingStore {
    entries: RwLock<HashMap<TrackingKey, DependencyTracking>>,
    producers: RwLock<HashMap<WaitFor, TrackingKey>>,
    leases: Mutex<HashMap<TrackingKey, Arc<AsyncMutex<()>>>>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("tracking store lock poisoned")
}

impl InMemoryTrackingStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn drop_producer_refs(
        producers: &mut HashMap<WaitFor, TrackingKey>,
        removed: &TrackingKey,
    ) {
        producers.retain(|_, key| key != removed);
    }

    fn sorted_for_dispatch(mut entries: Vec<DependencyTracking>) -> Vec<DependencyTracking> {
        entries.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.key.cmp(&b.key)));
        entries
    }
}

#[async_trait]
impl TrackingStore for InMemoryTrackingStore {
    async fn get(&self, key: &TrackingKey) -> Result<Option<DependencyTracking>> {
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries.get(key).cloned())
    }

    async fn contains(&self, key: &TrackingKey) -> Result<bool> {
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries.contains_key(key))
    }

    async fn put(&self, entry: DependencyTracking) -> Result<StatusChange> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        let key = entry.key;
        let sink_id = entry.sink_id;
        let to = entry.status;
        let previous = entries.insert(key, entry);
        drop(entries);
        Ok(StatusChange {
            key,
            sink_id,
            from: previous.map(|p| p.status),
            to: Some(to),
        })
    }

    async fn remove(&self, key: &TrackingKey) -> Result<Option<StatusChange>> {
        let removed = {
            let mut entries = self.entries.write().map_err(poison_err)?;
            entries.remove(key)
        };
        let Some(entry) = removed else {
            return Ok(None);
        };
        let mut producers = self.producers.write().map_err(poison_err)?;
        Self::drop_producer_refs(&mut producers, key);
        drop(producers);
        Ok(Some(StatusChange::removed(
            entry.key,
            entry.sink_id,
            entry.status,
        )))
    }

    async fn remove_job(&self, job_id: JobId) -> Result<Vec<StatusChange>> {
        let removed: Vec<DependencyTracking> = {
            let mut entries = self.entries.write().map_err(poison_err)?;
            let keys: Vec<TrackingKey> = entries
                .keys()
                .filter(|k| k.job_id == job_id)
                .copied()
                .collect();
            keys.iter().filter_map(|k| entries.remove(k)).collect()
        };
        let mut producers = self.producers.write().map_err(poison_err)?;
        for entry in &removed {
            Self::drop_producer_refs(&mut producers, &entry.key);
        }
        drop(producers);
        Ok(removed
            .into_iter()
            .map(|e| StatusChange::removed(e.key, e.sink_id, e.status))
            .collect())
    }

    async fn with_entry(
        &self,
        key: &TrackingKey,
        mutator: EntryMutator,
    ) -> Result<Option<StatusChange>> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        let from = entry.status;
        mutator(entry);
        entry.touch();
        let change = StatusChange::transitioned(entry.key, entry.sink_id, from, entry.status);
        drop(entries);
        Ok(Some(change))
    }

    async fn transition(
        &self,
        key: &TrackingKey,
        to: ChunkSchedulingStatus,
    ) -> Result<Option<StatusChange>> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        let from = entry.status;
        entry.status = to;
        entry.touch();
        let change = StatusChange::transitioned(entry.key, entry.sink_id, from, to);
        drop(entries);
        Ok(Some(change))
    }

    async fn transition_checked(
        &self,
        key: &TrackingKey,
        to: ChunkSchedulingStatus,
    ) -> Result<TransitionOutcome> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(TransitionOutcome::NotFound);
        };
        let from = entry.status;
        if !from.can_transition_to(to) {
            drop(entries);
            return Ok(TransitionOutcome::Rejected { actual: from });
        }
        entry.status = to;
        entry.touch();
        let change = StatusChange::transitioned(entry.key, entry.sink_id, from, to);
        drop(entries);
        Ok(TransitionOutcome::Applied(change))
    }

    async fn raise_priority(
        &self,
        key: &TrackingKey,
        priority: i32,
    ) -> Result<Option<BTreeSet<TrackingKey>>> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        if entry.priority >= priority {
            drop(entries);
            return Ok(None);
        }
        entry.priority = priority;
        entry.touch();
        let waiting_on = entry.waiting_on.clone();
        drop(entries);
        Ok(Some(waiting_on))
    }

    async fn add_waiting_on(
        &self,
        key: &TrackingKey,
        blockers: BTreeSet<TrackingKey>,
    ) -> Result<Option<StatusChange>> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        let from = entry.status;
        entry.waiting_on.extend(blockers);
        if !entry.waiting_on.is_empty() && from == ChunkSchedulingStatus::ReadyForProcessing {
            entry.status = ChunkSchedulingStatus::Blocked;
        }
        entry.touch();
        let change = StatusChange::transitioned(entry.key, entry.sink_id, from, entry.status);
        drop(entries);
        Ok(Some(change))
    }

    async fn remove_waiting_on(
        &self,
        key: &TrackingKey,
        blocker: &TrackingKey,
    ) -> Result<Option<StatusChange>> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        let from = entry.status;
        entry.waiting_on.remove(blocker);
        if entry.waiting_on.is_empty() && from == ChunkSchedulingStatus::Blocked {
            entry.status = ChunkSchedulingStatus::QueuedForProcessing;
        }
        entry.touch();
        let change = StatusChange::transitioned(entry.key, entry.sink_id, from, entry.status);
        drop(entries);
        Ok(Some(change))
    }

    async fn prune_blocker(&self, blocker: &TrackingKey) -> Result<Vec<StatusChange>> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        let mut unblocked = Vec::new();
        for entry in entries.values_mut() {
            if !entry.waiting_on.remove(blocker) {
                continue;
            }
            entry.touch();
            if entry.waiting_on.is_empty() && entry.status == ChunkSchedulingStatus::Blocked {
                entry.status = ChunkSchedulingStatus::QueuedForProcessing;
                unblocked.push(StatusChange::transitioned(
                    entry.key,
                    entry.sink_id,
                    ChunkSchedulingStatus::Blocked,
                    ChunkSchedulingStatus::QueuedForProcessing,
                ));
            }
        }
        drop(entries);
        Ok(unblocked)
    }

    async fn find_by_status(
        &self,
        status: ChunkSchedulingStatus,
        sink_id: Option<SinkId>,
        limit: Option<usize>,
    ) -> Result<Vec<DependencyTracking>> {
        let entries = self.entries.read().map_err(poison_err)?;
        let matching: Vec<DependencyTracking> = entries
            .values()
            .filter(|e| e.status == status && sink_id.is_none_or(|s| e.sink_id == s))
            .cloned()
            .collect();
        drop(entries);
        let mut sorted = Self::sorted_for_dispatch(matching);
        if let Some(limit) = limit {
            sorted.truncate(limit);
        }
        Ok(sorted)
    }

    async fn find_stale(
        &self,
        status: ChunkSchedulingStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DependencyTracking>> {
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries
            .values()
            .filter(|e| e.status == status && e.is_stale(cutoff))
            .cloned()
            .collect())
    }

    async fn job_snapshot(&self, job_id: JobId) -> Result<Vec<DependencyTracking>> {
        let entries = self.entries.read().map_err(poison_err)?;
        let mut snapshot: Vec<DependencyTracking> = entries
            .values()
            .filter(|e| e.key.job_id == job_id)
            .cloned()
            .collect();
        drop(entries);
        snapshot.sort_by_key(|e| e.key.chunk_id);
        Ok(snapshot)
    }

    async fn waiting_on(&self, blocker: &TrackingKey) -> Result<Vec<TrackingKey>> {
        let entries = self.entries.read().map_err(poison_err)?;
        let mut keys: Vec<TrackingKey> = entries
            .values()
            .filter(|e| e.waiting_on.contains(blocker))
            .map(|e| e.key)
            .collect();
        drop(entries);
        keys.sort_unstable();
        Ok(keys)
    }

    async fn overlapping(
        &self,
        sink_id: SinkId,
        submitter: SubmitterId,
        hashes: &[i32],
    ) -> Result<Vec<DependencyTracking>> {
        let probe: HashSet<i32> = hashes.iter().copied().collect();
        let entries = self.entries.read().map_err(poison_err)?;
        let mut matching: Vec<DependencyTracking> = entries
            .values()
            .filter(|e| {
                e.sink_id == sink_id
                    && e.submitter == submitter
                    && e.hashes().iter().any(|h| probe.contains(h))
            })
            .cloned()
            .collect();
        drop(entries);
        matching.sort_by_key(|e| e.key);
        Ok(matching)
    }

    async fn barrier_members(
        &self,
        sink_id: SinkId,
        job_id: JobId,
        keys: &BTreeSet<String>,
    ) -> Result<Vec<TrackingKey>> {
        let entries = self.entries.read().map_err(poison_err)?;
        let mut members: Vec<TrackingKey> = entries
            .values()
            .filter(|e| {
                e.sink_id == sink_id
                    && (e.key.job_id == job_id || !e.match_keys().is_disjoint(keys))
            })
            .map(|e| e.key)
            .collect();
        drop(entries);
        members.sort_unstable();
        Ok(members)
    }

    async fn active_sinks(&self, status: ChunkSchedulingStatus) -> Result<BTreeSet<SinkId>> {
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries
            .values()
            .filter(|e| e.status == status)
            .map(|e| e.sink_id)
            .collect())
    }

    async fn status_counts(&self, sink_ids: Option<&BTreeSet<SinkId>>) -> Result<StatusCounts> {
        let entries = self.entries.read().map_err(poison_err)?;
        let mut counts = StatusCounts::new();
        for entry in entries.values() {
            if sink_ids.is_some_and(|sinks| !sinks.is_empty() && !sinks.contains(&entry.sink_id)) {
                continue;
            }
            *counts
                .entry(entry.sink_id)
                .or_default()
                .entry(entry.status)
                .or_insert(0) += 1;
        }
        drop(entries);
        Ok(counts)
    }

    async fn job_ids(&self) -> Result<BTreeSet<JobId>> {
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries.keys().map(|k| k.job_id).collect())
    }

    async fn job_count(&self, sink_id: SinkId) -> Result<JobOccupancy> {
        let entries = self.entries.read().map_err(poison_err)?;
        let mut jobs = BTreeSet::new();
        let mut chunks = 0usize;
        for entry in entries.values().filter(|e| e.sink_id == sink_id) {
            jobs.insert(entry.key.job_id);
            chunks += 1;
        }
        drop(entries);
        Ok(JobOccupancy {
            jobs: jobs.len(),
            chunks,
        })
    }

    async fn len(&self) -> Result<usize> {
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries.len())
    }

    async fn record_producer(&self, wait_for: WaitFor, key: TrackingKey) -> Result<()> {
        let mut producers = self.producers.write().map_err(poison_err)?;
        producers.insert(wait_for, key);
        drop(producers);
        Ok(())
    }

    async fn last_producer(&self, wait_for: &WaitFor) -> Result<Option<TrackingKey>> {
        let producers = self.producers.read().map_err(poison_err)?;
        Ok(producers.get(wait_for).copied())
    }

    async fn rebuild_producer_index(&self) -> Result<HashMap<WaitFor, TrackingKey>> {
        let rebuilt = {
            let entries = self.entries.read().map_err(poison_err)?;
            let mut index: HashMap<WaitFor, TrackingKey> = HashMap::new();
            for entry in entries.values() {
                for wait_for in entry.wait_for_keys() {
                    index
                        .entry(wait_for)
                        .and_modify(|existing| {
                            if entry.key > *existing {
                                *existing = entry.key;
                            }
                        })
                        .or_insert(entry.key);
                }
            }
            index
        };
        let mut producers = self.producers.write().map_err(poison_err)?;
        producers.clone_from(&rebuilt);
        drop(producers);
        Ok(rebuilt)
    }

    async fn producer_index_snapshot(&self) -> Result<HashMap<WaitFor, TrackingKey>> {
        let producers = self.producers.read().map_err(poison_err)?;
        Ok(producers.clone())
    }

    async fn lock_entry(&self, key: &TrackingKey, timeout: Duration) -> Result<EntryLease> {
        let lock = {
            let mut leases = self.leases.lock().map_err(poison_err)?;
            Arc::clone(
                leases
                    .entry(*key)
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(EntryLease::from_guard(guard)),
            Err(_) => Err(Error::LockTimeout { key: *key, timeout }),
        }
    }

    async fn reload(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marcflow_core::ChunkId;

    fn key(job: i32, chunk: i32) -> TrackingKey {
        TrackingKey::new(JobId::new(job), ChunkId::new(chunk))
    }

    fn entry(job: i32, chunk: i32, sink: i32) -> DependencyTracking {
        DependencyTracking::new(key(job, chunk), SinkId::new(sink), SubmitterId::new(700_000))
    }

    #[tokio::test]
    async fn put_get_remove_roundtrip() -> Result<()> {
        let store = InMemoryTrackingStore::new();
        let e = entry(1, 0, 5);

        let change = store.put(e.clone()).await?;
        assert_eq!(change.from, None);
        assert_eq!(change.to, Some(ChunkSchedulingStatus::ReadyForProcessing));
        assert_eq!(store.len().await?, 1);
        assert_eq!(store.get(&e.key).await?.unwrap().key, e.key);

        let removed = store.remove(&e.key).await?.unwrap();
        assert_eq!(removed.to, None);
        assert!(store.get(&e.key).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn remove_is_noop_for_absent_key() -> Result<()> {
        let store = InMemoryTrackingStore::new();
        assert!(store.remove(&key(9, 9)).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn remove_clears_producer_references() -> Result<()> {
        let store = InMemoryTrackingStore::new();
        let e = entry(1, 0, 5).with_match_keys(["K1".to_string()]);
        let wait_for = e.wait_for_keys()[0];
        store.put(e.clone()).await?;
        store.record_producer(wait_for, e.key).await?;

        store.remove(&e.key).await?;
        assert!(store.last_producer(&wait_for).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn transition_checked_rejects_illegal() -> Result<()> {
        let store = InMemoryTrackingStore::new();
        let e = entry(1, 0, 5);
        store.put(e.clone()).await?;

        let outcome = store
            .transition_checked(&e.key, ChunkSchedulingStatus::Delivering)
            .await?;
        assert_eq!(
            outcome,
            TransitionOutcome::Rejected {
                actual: ChunkSchedulingStatus::ReadyForProcessing
            }
        );

        let outcome = store
            .transition_checked(&e.key, ChunkSchedulingStatus::QueuedForProcessing)
            .await?;
        assert!(outcome.is_applied());

        Ok(())
    }

    #[tokio::test]
    async fn transition_checked_not_found_for_absent_key() -> Result<()> {
        let store = InMemoryTrackingStore::new();
        let outcome = store
            .transition_checked(&key(1, 0), ChunkSchedulingStatus::Processing)
            .await?;
        assert_eq!(outcome, TransitionOutcome::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn prune_blocker_unblocks_emptied_entries() -> Result<()> {
        let store = InMemoryTrackingStore::new();
        let blocker = entry(1, 0, 5);
        let mut waiter = entry(1, 1, 5);
        waiter.set_waiting_on([blocker.key].into());
        let mut double_waiter = entry(1, 2, 5);
        double_waiter.set_waiting_on([blocker.key, waiter.key].into());

        store.put(blocker.clone()).await?;
        store.put(waiter.clone()).await?;
        store.put(double_waiter.clone()).await?;

        let unblocked = store.prune_blocker(&blocker.key).await?;
        assert_eq!(unblocked.len(), 1);
        assert_eq!(unblocked[0].key, waiter.key);
        assert_eq!(
            unblocked[0].to,
            Some(ChunkSchedulingStatus::QueuedForProcessing)
        );

        // still waiting on the other blocker
        let remaining = store.get(&double_waiter.key).await?.unwrap();
        assert_eq!(remaining.status, ChunkSchedulingStatus::Blocked);
        assert_eq!(remaining.waiting_on, [waiter.key].into());

        Ok(())
    }

    #[tokio::test]
    async fn raise_priority_is_monotonic() -> Result<()> {
        let store = InMemoryTrackingStore::new();
        let e = entry(1, 0, 5).with_priority(4);
        store.put(e.clone()).await?;

        assert!(store.raise_priority(&e.key, 7).await?.is_some());
        assert_eq!(store.get(&e.key).await?.unwrap().priority, 7);

        // lower or equal values leave the entry untouched
        assert!(store.raise_priority(&e.key, 4).await?.is_none());
        assert_eq!(store.get(&e.key).await?.unwrap().priority, 7);

        Ok(())
    }

    #[tokio::test]
    async fn find_by_status_orders_by_priority_then_key() -> Result<()> {
        let store = InMemoryTrackingStore::new();
        store.put(entry(1, 0, 5).with_priority(1)).await?;
        store.put(entry(1, 1, 5).with_priority(7)).await?;
        store.put(entry(2, 0, 5).with_priority(4)).await?;
        store.put(entry(3, 0, 9).with_priority(7)).await?;

        let found = store
            .find_by_status(ChunkSchedulingStatus::ReadyForProcessing, Some(SinkId::new(5)), None)
            .await?;
        let keys: Vec<TrackingKey> = found.iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![key(1, 1), key(2, 0), key(1, 0)]);

        let limited = store
            .find_by_status(ChunkSchedulingStatus::ReadyForProcessing, None, Some(2))
            .await?;
        assert_eq!(limited.len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn overlapping_respects_sink_and_submitter_scope() -> Result<()> {
        let store = InMemoryTrackingStore::new();
        let probe = entry(1, 0, 5).with_match_keys(["K1".to_string()]);
        let other_sink = DependencyTracking::new(key(2, 0), SinkId::new(6), probe.submitter)
            .with_match_keys(["K1".to_string()]);
        let match_hit = entry(3, 0, 5).with_match_keys(["K1".to_string(), "K9".to_string()]);
        store.put(other_sink).await?;
        store.put(match_hit.clone()).await?;

        let found = store
            .overlapping(probe.sink_id, probe.submitter, probe.hashes())
            .await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, match_hit.key);

        Ok(())
    }

    #[tokio::test]
    async fn barrier_members_match_job_or_key() -> Result<()> {
        let store = InMemoryTrackingStore::new();
        store.put(entry(1, 0, 5).with_match_keys(["D1".to_string()])).await?;
        store.put(entry(1, 1, 5)).await?;
        store.put(entry(2, 0, 5).with_match_keys(["D1".to_string()])).await?;
        store.put(entry(3, 0, 5).with_match_keys(["D2".to_string()])).await?;

        let members = store
            .barrier_members(SinkId::new(5), JobId::new(1), &["D1".to_string()].into())
            .await?;
        assert_eq!(members, vec![key(1, 0), key(1, 1), key(2, 0)]);

        Ok(())
    }

    #[tokio::test]
    async fn status_counts_aggregate_by_sink() -> Result<()> {
        let store = InMemoryTrackingStore::new();
        store.put(entry(1, 0, 5)).await?;
        store.put(entry(1, 1, 5).with_status(ChunkSchedulingStatus::Blocked)).await?;
        store.put(entry(2, 0, 9)).await?;

        let counts = store.status_counts(None).await?;
        assert_eq!(
            counts[&SinkId::new(5)][&ChunkSchedulingStatus::ReadyForProcessing],
            1
        );
        assert_eq!(counts[&SinkId::new(5)][&ChunkSchedulingStatus::Blocked], 1);
        assert_eq!(
            counts[&SinkId::new(9)][&ChunkSchedulingStatus::ReadyForProcessing],
            1
        );

        let scoped = store.status_counts(Some(&[SinkId::new(9)].into())).await?;
        assert!(!scoped.contains_key(&SinkId::new(5)));
        assert!(scoped.contains_key(&SinkId::new(9)));

        Ok(())
    }

    #[tokio::test]
    async fn rebuild_index_keeps_latest_producer() -> Result<()> {
        let store = InMemoryTrackingStore::new();
        let older = entry(1, 0, 5).with_match_keys(["K1".to_string()]);
        let newer = entry(1, 3, 5).with_match_keys(["K1".to_string()]);
        let wait_for = older.wait_for_keys()[0];
        store.put(older).await?;
        store.put(newer.clone()).await?;

        let rebuilt = store.rebuild_producer_index().await?;
        assert_eq!(rebuilt[&wait_for], newer.key);
        assert_eq!(store.producer_index_snapshot().await?, rebuilt);

        Ok(())
    }

    #[tokio::test]
    async fn lock_entry_times_out_under_contention() {
        let store = InMemoryTrackingStore::new();
        let k = key(1, 0);
        let lease = store
            .lock_entry(&k, Duration::from_millis(50))
            .await
            .unwrap();

        let result = store.lock_entry(&k, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::LockTimeout { .. })));

        drop(lease);
        assert!(store.lock_entry(&k, Duration::from_millis(10)).await.is_ok());
    }

    #[tokio::test]
    async fn find_stale_uses_last_modified() -> Result<()> {
        let store = InMemoryTrackingStore::new();
        let mut old = entry(1, 0, 5).with_status(ChunkSchedulingStatus::Processing);
        old.last_modified = Utc::now() - chrono::Duration::hours(2);
        let fresh = entry(1, 1, 5).with_status(ChunkSchedulingStatus::Processing);
        store.put(old.clone()).await?;
        store.put(fresh).await?;

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let stale = store
            .find_stale(ChunkSchedulingStatus::Processing, cutoff)
            .await?;
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].key, old.key);

        Ok(())
    }

    #[tokio::test]
    async fn remove_job_drops_all_chunks() -> Result<()> {
        let store = InMemoryTrackingStore::new();
        store.put(entry(1, 0, 5)).await?;
        store.put(entry(1, 1, 5)).await?;
        store.put(entry(2, 0, 5)).await?;

        let removed = store.remove_job(JobId::new(1)).await?;
        assert_eq!(removed.len(), 2);
        assert_eq!(store.len().await?, 1);
        assert_eq!(store.job_ids().await?, [JobId::new(2)].into());

        Ok(())
    }

    #[tokio::test]
    async fn job_count_for_sink() -> Result<()> {
        let store = InMemoryTrackingStore::new();
        store.put(entry(1, 0, 5)).await?;
        store.put(entry(1, 1, 5)).await?;
        store.put(entry(2, 0, 5)).await?;
        store.put(entry(3, 0, 9)).await?;

        let occupancy = store.job_count(SinkId::new(5)).await?;
        assert_eq!(occupancy, JobOccupancy { jobs: 2, chunks: 3 });

        Ok(())
    }
}
