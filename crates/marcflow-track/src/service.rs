//! The dependency tracking service.
//!
//! Orchestration layer over the [`TrackingStore`]: adds new chunks with
//! computed dependencies, atomically mutates individual entries, resolves
//! wait sets as chunks complete, and exposes the per-sink occupancy
//! queries the scheduler admits work against.
//!
//! ## Concurrency
//!
//! No global lock serializes the service. Mutations are atomic per key
//! (store transforms) and counters are updated from the deltas those
//! transforms report, so independent chunks are never serialized against
//! each other. The service never caches entries across calls; every
//! operation re-reads through the store.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use marcflow_core::{match_hash, JobId, Priority, SinkId};

use crate::counters::{SinkCounters, SubmitMode};
use crate::error::{Error, Result};
use crate::metrics::TrackMetrics;
use crate::store::{EntryMutator, JobOccupancy, TrackingStore, TransitionOutcome};
use crate::tracking::{CapacityConfig, ChunkSchedulingStatus, DependencyTracking, StatusChange};
use crate::tracking_key::{TrackingKey, WaitFor};

/// Configuration for the tracking service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Per-sink admission bounds.
    pub capacities: CapacityConfig,
    /// Acquisition timeout for the per-entry lease taken by [`DependencyTrackingService::modify`].
    pub lock_timeout: Duration,
    /// Resolve dependencies through the last-producer index.
    ///
    /// The index is a best-effort accelerator; disabling it falls back to
    /// the authoritative hash-overlap scan.
    pub use_producer_index: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            capacities: CapacityConfig::default(),
            lock_timeout: Duration::from_secs(120),
            use_producer_index: true,
        }
    }
}

impl ServiceConfig {
    /// Sets the admission bounds.
    #[must_use]
    pub const fn with_capacities(mut self, capacities: CapacityConfig) -> Self {
        self.capacities = capacities;
        self
    }

    /// Sets the per-entry lease timeout.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Enables or disables the last-producer index.
    #[must_use]
    pub const fn with_producer_index(mut self, enabled: bool) -> Self {
        self.use_producer_index = enabled;
        self
    }
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("sink counter lock poisoned")
}

/// Cluster-wide chunk scheduling state.
///
/// One instance per node, all sharing the same [`TrackingStore`]. The
/// store handle is injected at construction and the counter cache is
/// rebuilt from map truth by [`Self::init`].
pub struct DependencyTrackingService {
    store: Arc<dyn TrackingStore>,
    config: ServiceConfig,
    counters: RwLock<HashMap<SinkId, SinkCounters>>,
    metrics: TrackMetrics,
}

impl std::fmt::Debug for DependencyTrackingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyTrackingService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DependencyTrackingService {
    /// Creates a service over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn TrackingStore>, config: ServiceConfig) -> Self {
        Self {
            store,
            config,
            counters: RwLock::new(HashMap::new()),
            metrics: TrackMetrics::new(),
        }
    }

    /// Recounts the sink counters from map truth.
    ///
    /// Run once at startup (and again whenever counter drift is suspected)
    /// before admitting work.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn init(self) -> Result<Self> {
        self.recount_sink_status(&BTreeSet::new()).await?;
        Ok(self)
    }

    /// Returns the service configuration.
    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // --- Adding entries ---

    /// Inserts a tracking entry as-is.
    ///
    /// Wait-set references to keys that are already gone are pruned
    /// immediately; the dependency computation may have raced a concurrent
    /// completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn add(&self, entry: DependencyTracking) -> Result<TrackingKey> {
        let key = entry.key;
        let waiting_on = entry.waiting_on.clone();
        let change = self.store.put(entry).await?;
        self.apply_change(&change)?;
        self.prune_dead_references(&key, &waiting_on).await?;
        Ok(key)
    }

    /// Registers a newly partitioned chunk, computing its wait set.
    ///
    /// The main scheduling entry point. Dependencies are discovered via the
    /// last-producer index (or the full hash-overlap scan when the index is
    /// disabled), reduced to the wait frontier, and installed on the entry
    /// before insertion. A `barrier` match key makes the chunk additionally
    /// wait for the previous carrier of that key, chaining all chunks of a
    /// barrier job. Everything in the resulting wait chain belonging to
    /// other jobs is boosted to this entry's priority.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    #[tracing::instrument(skip(self, entry), fields(key = %entry.key, sink = %entry.sink_id))]
    pub async fn add_and_build_dependencies(
        &self,
        mut entry: DependencyTracking,
        barrier: Option<&str>,
    ) -> Result<TrackingKey> {
        let waiting_on = self.find_chunks_to_wait_for(&entry, barrier).await?;
        entry.set_waiting_on(waiting_on.clone());

        let origin = entry.key.job_id;
        let priority = entry.priority;
        let mut producer_keys = entry.wait_for_keys();
        if let Some(barrier) = barrier {
            producer_keys.push(WaitFor::for_key(entry.sink_id, entry.submitter, barrier));
        }

        let key = self.add(entry).await?;
        if self.config.use_producer_index {
            for wait_for in producer_keys {
                self.store.record_producer(wait_for, key).await?;
            }
        }
        if !waiting_on.is_empty() {
            debug!(%key, blockers = waiting_on.len(), "chunk enters blocked");
            self.boost_priorities(origin, waiting_on, priority).await?;
        }
        Ok(key)
    }

    /// Computes the wait set for an entry without installing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn find_chunks_to_wait_for(
        &self,
        entry: &DependencyTracking,
        barrier: Option<&str>,
    ) -> Result<BTreeSet<TrackingKey>> {
        if entry.match_keys().is_empty() && barrier.is_none() {
            return Ok(BTreeSet::new());
        }

        let candidates = if self.config.use_producer_index {
            let mut wait_fors = entry.wait_for_keys();
            if let Some(barrier) = barrier {
                wait_fors.push(WaitFor::for_key(entry.sink_id, entry.submitter, barrier));
            }
            let mut seen = BTreeSet::new();
            let mut candidates = Vec::new();
            for wait_for in wait_fors {
                let Some(producer) = self.store.last_producer(&wait_for).await? else {
                    continue;
                };
                if producer == entry.key || !seen.insert(producer) {
                    continue;
                }
                // index entries may outlive their producer briefly
                if let Some(candidate) = self.store.get(&producer).await? {
                    candidates.push(candidate);
                }
            }
            candidates
        } else {
            let mut hashes = entry.hashes().to_vec();
            if let Some(barrier) = barrier {
                hashes.push(match_hash(barrier));
            }
            self.store
                .overlapping(entry.sink_id, entry.submitter, &hashes)
                .await?
                .into_iter()
                .filter(|candidate| candidate.key != entry.key)
                .collect()
        };

        Ok(Self::reduce_dependencies(&candidates))
    }

    /// Reduces a candidate wait set to its frontier.
    ///
    /// A candidate already covered by another candidate's wait set is
    /// dropped: waiting on the frontier preserves order, because the
    /// covered chunk can only proceed after its own blockers anyway.
    /// Without this step a chain of N sequentially dependent chunks would
    /// each accumulate all N-1 predecessors, turning O(1) unblock fan-out
    /// into O(N). The computation is idempotent.
    #[must_use]
    pub fn reduce_dependencies(candidates: &[DependencyTracking]) -> BTreeSet<TrackingKey> {
        if candidates.is_empty() {
            return BTreeSet::new();
        }
        let referenced: HashSet<TrackingKey> = candidates
            .iter()
            .flat_map(|candidate| candidate.waiting_on.iter().copied())
            .collect();
        candidates
            .iter()
            .map(|candidate| candidate.key)
            .filter(|key| !referenced.contains(key))
            .collect()
    }

    // --- Mutating entries ---

    /// Applies an arbitrary mutation to one entry under its lease.
    ///
    /// The single primitive for ad hoc changes: acquires the per-key lease
    /// (bounded by the configured timeout), runs the mutator against the
    /// current value, stamps the entry, updates counters by delta, and
    /// re-prunes dead wait-set references. A silent no-op (logged) if the
    /// entry was concurrently removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockTimeout`] when the lease cannot be acquired,
    /// or a storage error if the store is unavailable. The mutation is
    /// abandoned on timeout; the caller must retry if it was essential.
    pub async fn modify(&self, key: TrackingKey, mutator: EntryMutator) -> Result<()> {
        let lease = self.store.lock_entry(&key, self.config.lock_timeout).await?;
        let change = self.store.with_entry(&key, mutator).await?;
        drop(lease);

        let Some(change) = change else {
            info!(%key, "unable to modify tracker, it has been deleted");
            return Ok(());
        };
        self.apply_change(&change)?;
        if let Some(entry) = self.store.get(&key).await? {
            self.prune_dead_references(&key, &entry.waiting_on).await?;
        }
        Ok(())
    }

    /// Unconditionally sets the status of an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn set_status(&self, key: TrackingKey, status: ChunkSchedulingStatus) -> Result<()> {
        match self.store.transition(&key, status).await? {
            Some(change) => self.apply_change(&change),
            None => {
                info!(%key, %status, "status change for unknown tracker ignored");
                Ok(())
            }
        }
    }

    /// Sets the status of an entry if the transition is legal.
    ///
    /// Illegal transitions are discarded without error: under concurrent
    /// completion the entry may already have progressed past the requested
    /// transition. Returns whether the transition was applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn set_validated_status(
        &self,
        key: TrackingKey,
        status: ChunkSchedulingStatus,
    ) -> Result<bool> {
        match self.store.transition_checked(&key, status).await? {
            TransitionOutcome::Applied(change) => {
                self.apply_change(&change)?;
                Ok(true)
            }
            TransitionOutcome::Rejected { actual } => {
                debug!(%key, requested = %status, %actual, "discarding illegal transition");
                Ok(false)
            }
            TransitionOutcome::NotFound => {
                info!(%key, %status, "status change for unknown tracker ignored");
                Ok(false)
            }
        }
    }

    /// Makes an entry wait for the given chunks.
    ///
    /// Explicit barrier wiring: candidates are filtered to those still
    /// live, reduced to the frontier, and unioned into the entry's wait
    /// set.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn add_to_chunks_to_wait_for(
        &self,
        key: TrackingKey,
        candidates: Vec<TrackingKey>,
    ) -> Result<()> {
        let mut live = Vec::new();
        for candidate in candidates {
            if candidate == key {
                continue;
            }
            if let Some(entry) = self.store.get(&candidate).await? {
                live.push(entry);
            }
        }
        let blockers = Self::reduce_dependencies(&live);
        if blockers.is_empty() {
            return Ok(());
        }
        match self.store.add_waiting_on(&key, blockers).await? {
            Some(change) => self.apply_change(&change),
            None => {
                info!(%key, "barrier target vanished before wiring");
                Ok(())
            }
        }
    }

    /// Releases every entry waiting on a completed chunk.
    ///
    /// Returns the keys that became eligible (`BLOCKED` →
    /// `QUEUED_FOR_PROCESSING`) so the caller can dispatch them without
    /// waiting for the next poll cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    #[tracing::instrument(skip(self), fields(%key))]
    pub async fn remove_from_waiting_on(&self, key: TrackingKey) -> Result<BTreeSet<TrackingKey>> {
        let changes = self.store.prune_blocker(&key).await?;
        self.apply_changes(&changes)?;
        let released: BTreeSet<TrackingKey> = changes.iter().map(|c| c.key).collect();
        if !released.is_empty() {
            self.metrics.record_unblocked("completion", released.len());
            debug!(count = released.len(), "chunks released by completion");
        }
        Ok(released)
    }

    /// Removes an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn remove(&self, key: TrackingKey) -> Result<()> {
        if let Some(change) = self.store.remove(&key).await? {
            self.apply_change(&change)?;
        }
        Ok(())
    }

    /// Removes every entry of a job (job abort).
    ///
    /// Entries of other jobs that were waiting on the removed chunks keep
    /// dangling references until the next mutation or
    /// [`Self::recheck_blocks`] pass prunes them.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn remove_job(&self, job_id: JobId) -> Result<usize> {
        let changes = self.store.remove_job(job_id).await?;
        self.apply_changes(&changes)?;
        if !changes.is_empty() {
            info!(%job_id, chunks = changes.len(), "removed trackers for job");
        }
        Ok(changes.len())
    }

    /// Self-healing sweep over blocked entries.
    ///
    /// Prunes wait-set references to keys that silently disappeared (a
    /// crashed node losing an update, an aborted job) and returns the keys
    /// this released. A correctness backstop, not the primary unblocking
    /// path.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn recheck_blocks(&self) -> Result<BTreeSet<TrackingKey>> {
        let blocked = self
            .store
            .find_by_status(ChunkSchedulingStatus::Blocked, None, None)
            .await?;
        let mut released = BTreeSet::new();
        for entry in blocked {
            for blocker in &entry.waiting_on {
                if self.store.contains(blocker).await? {
                    continue;
                }
                if let Some(change) = self.store.remove_waiting_on(&entry.key, blocker).await? {
                    self.apply_change(&change)?;
                    if change.to == Some(ChunkSchedulingStatus::QueuedForProcessing) {
                        released.insert(entry.key);
                    }
                }
            }
        }
        if !released.is_empty() {
            self.metrics.record_unblocked("recheck", released.len());
            info!(count = released.len(), "blocked recheck released chunks");
        }
        Ok(released)
    }

    // --- Priority boosting ---

    /// Raises the priority of a wait chain, across job boundaries only.
    ///
    /// Worklist traversal with a visited set, so cyclic or convergent wait
    /// graphs terminate. Priorities are only ever raised; entries of the
    /// originating job are skipped (a job's own chain needs no boost
    /// relative to itself), and the whole cascade is a no-op at
    /// [`Priority::Low`] and below.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn boost_priorities(
        &self,
        origin: JobId,
        keys: impl IntoIterator<Item = TrackingKey> + Send,
        priority: i32,
    ) -> Result<()> {
        if priority <= Priority::Low.value() {
            return Ok(());
        }
        let mut visited: HashSet<TrackingKey> = HashSet::new();
        let mut queue: VecDeque<TrackingKey> = keys.into_iter().collect();
        while let Some(key) = queue.pop_front() {
            if !visited.insert(key) || key.job_id == origin {
                continue;
            }
            if let Some(waiting_on) = self.store.raise_priority(&key, priority).await? {
                queue.extend(waiting_on);
            }
        }
        Ok(())
    }

    // --- Queries ---

    /// Gets an entry by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn get(&self, key: TrackingKey) -> Result<Option<DependencyTracking>> {
        self.store.get(&key).await
    }

    /// Returns true if the chunk is currently tracked.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn is_scheduled(&self, key: TrackingKey) -> Result<bool> {
        self.store.contains(&key).await
    }

    /// Keys in a status, best-effort dispatch order, optionally scoped and
    /// limited.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn find(
        &self,
        status: ChunkSchedulingStatus,
        sink_id: Option<SinkId>,
        limit: Option<usize>,
    ) -> Result<Vec<TrackingKey>> {
        Ok(self
            .find_entries(status, sink_id, limit)
            .await?
            .into_iter()
            .map(|entry| entry.key)
            .collect())
    }

    /// Entries in a status, best-effort dispatch order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn find_entries(
        &self,
        status: ChunkSchedulingStatus,
        sink_id: Option<SinkId>,
        limit: Option<usize>,
    ) -> Result<Vec<DependencyTracking>> {
        self.store.find_by_status(status, sink_id, limit).await
    }

    /// Every entry of a job, in chunk order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn snapshot(&self, job_id: JobId) -> Result<Vec<DependencyTracking>> {
        self.store.job_snapshot(job_id).await
    }

    /// Entries in a status untouched for longer than `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn stale(
        &self,
        status: ChunkSchedulingStatus,
        timeout: Duration,
    ) -> Result<Vec<DependencyTracking>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::zero());
        self.store.find_stale(status, cutoff).await
    }

    /// Admin repair: moves every entry of the given jobs from one status to
    /// another. Returns the number of entries moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn reset_status(
        &self,
        from: ChunkSchedulingStatus,
        to: ChunkSchedulingStatus,
        job_ids: &[JobId],
    ) -> Result<usize> {
        let entries = self.store.find_by_status(from, None, None).await?;
        let mut moved = 0;
        for entry in entries {
            if !job_ids.contains(&entry.key.job_id) {
                continue;
            }
            self.set_status(entry.key, to).await?;
            moved += 1;
        }
        Ok(moved)
    }

    /// Keys of chunks currently waiting for the given chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn chunks_waiting_for(&self, key: TrackingKey) -> Result<Vec<TrackingKey>> {
        self.store.waiting_on(&key).await
    }

    /// One sink's chunks belonging to a job or carrying one of its barrier
    /// keys; the candidate set for a job termination barrier.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn find_job_barrier(
        &self,
        sink_id: SinkId,
        job_id: JobId,
        keys: &BTreeSet<String>,
    ) -> Result<Vec<TrackingKey>> {
        self.store.barrier_members(sink_id, job_id, keys).await
    }

    /// Sinks with at least one entry in the given status.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn active_sinks(&self, status: ChunkSchedulingStatus) -> Result<BTreeSet<SinkId>> {
        self.store.active_sinks(status).await
    }

    /// Jobs with live entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn job_ids(&self) -> Result<BTreeSet<JobId>> {
        self.store.job_ids().await
    }

    /// Job/chunk occupancy of one sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn job_count(&self, sink_id: SinkId) -> Result<JobOccupancy> {
        self.store.job_count(sink_id).await
    }

    // --- Capacity and counters ---

    /// Number of tracked chunks in a status for one sink, from the counter
    /// cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter lock is poisoned.
    pub fn count(&self, sink_id: SinkId, status: ChunkSchedulingStatus) -> Result<usize> {
        let counters = self.counters.read().map_err(poison_err)?;
        Ok(counters.get(&sink_id).map_or(0, |c| c.count(status)))
    }

    /// Remaining admission capacity for a bounded status, never negative.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCapacityBound`] for statuses without a configured
    /// maximum; capacity is meaningless there.
    pub fn capacity(&self, sink_id: SinkId, status: ChunkSchedulingStatus) -> Result<usize> {
        let bound = status
            .capacity_bound(&self.config.capacities)
            .ok_or_else(|| Error::NoCapacityBound {
                status: status.to_string(),
            })?;
        Ok(bound.saturating_sub(self.count(sink_id, status)?))
    }

    /// Snapshot of every sink's counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter lock is poisoned.
    pub fn counters_for_sinks(&self) -> Result<HashMap<SinkId, SinkCounters>> {
        let counters = self.counters.read().map_err(poison_err)?;
        Ok(counters.clone())
    }

    /// Submit mode of the phase feeding the given status for one sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter lock is poisoned.
    pub fn submit_mode(&self, sink_id: SinkId, status: ChunkSchedulingStatus) -> Result<SubmitMode> {
        let counters = self.counters.read().map_err(poison_err)?;
        Ok(counters
            .get(&sink_id)
            .map_or(SubmitMode::Direct, |c| c.mode_for(status)))
    }

    /// Sets the submit mode of the phase feeding the given status.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter lock is poisoned.
    pub fn set_submit_mode(
        &self,
        sink_id: SinkId,
        status: ChunkSchedulingStatus,
        mode: SubmitMode,
    ) -> Result<()> {
        let mut counters = self.counters.write().map_err(poison_err)?;
        counters.entry(sink_id).or_default().set_mode_for(status, mode);
        drop(counters);
        Ok(())
    }

    /// Recomputes the counter cache from map truth.
    ///
    /// Scoped to the given sinks, or all sinks when the set is empty. Safe
    /// to run at any time; converges counters to the store content and
    /// flips the affected sinks to bulk mode so the poll loop re-drains
    /// them.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn recount_sink_status(&self, sink_ids: &BTreeSet<SinkId>) -> Result<()> {
        let scope = if sink_ids.is_empty() {
            None
        } else {
            Some(sink_ids)
        };
        let counts = self.store.status_counts(scope).await?;

        let mut counters = self.counters.write().map_err(poison_err)?;
        if sink_ids.is_empty() {
            counters.clear();
        } else {
            for sink_id in sink_ids {
                counters.remove(sink_id);
            }
        }
        for (sink_id, histogram) in counts {
            let sink_counters = SinkCounters::from_counts(histogram);
            self.metrics
                .set_blocked(sink_id, sink_counters.count(ChunkSchedulingStatus::Blocked));
            counters.insert(sink_id, sink_counters);
        }
        drop(counters);
        self.metrics.record_recount();
        Ok(())
    }

    /// Re-reads the store through its backing storage and recounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn reload(&self) -> Result<()> {
        self.store.reload().await?;
        self.recount_sink_status(&BTreeSet::new()).await
    }

    // --- Producer index audit ---

    /// Recomputes the last-producer index from live entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn rebuild_producer_index(&self) -> Result<HashMap<WaitFor, TrackingKey>> {
        self.store.rebuild_producer_index().await
    }

    /// Snapshot of the current last-producer index.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn producer_index_snapshot(&self) -> Result<HashMap<WaitFor, TrackingKey>> {
        self.store.producer_index_snapshot().await
    }

    // --- Internals ---

    /// Applies one mutation delta to the counter cache.
    fn apply_change(&self, change: &StatusChange) -> Result<()> {
        if !change.is_effective() {
            return Ok(());
        }
        self.metrics.record_change(change);
        let mut counters = self.counters.write().map_err(poison_err)?;
        counters.entry(change.sink_id).or_default().apply(change);
        drop(counters);
        Ok(())
    }

    fn apply_changes(&self, changes: &[StatusChange]) -> Result<()> {
        for change in changes {
            self.apply_change(change)?;
        }
        Ok(())
    }

    /// Drops wait-set references to keys that are no longer live.
    async fn prune_dead_references(
        &self,
        key: &TrackingKey,
        waiting_on: &BTreeSet<TrackingKey>,
    ) -> Result<()> {
        for blocker in waiting_on {
            if self.store.contains(blocker).await? {
                continue;
            }
            debug!(%key, %blocker, "pruning dead wait reference");
            if let Some(change) = self.store.remove_waiting_on(key, blocker).await? {
                self.apply_change(&change)?;
            }
        }
        Ok(())
    }
}
