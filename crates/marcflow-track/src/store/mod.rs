//! Pluggable storage for the dependency-tracking map.
//!
//! The [`TrackingStore`] trait defines the cluster-wide map from
//! [`TrackingKey`] to [`DependencyTracking`] plus its auxiliary structures:
//! the last-producer index and the per-key lease used by `modify`.
//!
//! ## Design Principles
//!
//! - **Atomic per-key transforms**: Every mutation executes against the
//!   stored value and reports a [`StatusChange`] delta, so counter upkeep
//!   stays correct under concurrent writers
//! - **Absent keys are no-ops**: A write directed at a key that no longer
//!   exists is ignored rather than resurrecting the entry; someone already
//!   finished that chunk
//! - **Testability**: In-memory implementation for single-node use and
//!   tests; a replicated implementation carries the same contract

pub mod memory;

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;

use marcflow_core::{JobId, SinkId, SubmitterId};

use crate::error::Result;
use crate::tracking::{ChunkSchedulingStatus, DependencyTracking, StatusChange};
use crate::tracking_key::{TrackingKey, WaitFor};

/// Function applied atomically against a stored entry.
pub type EntryMutator = Box<dyn FnOnce(&mut DependencyTracking) + Send>;

/// Histogram of live entries per status, per sink.
pub type StatusCounts = HashMap<SinkId, HashMap<ChunkSchedulingStatus, usize>>;

/// Result of a validated status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition was applied.
    Applied(StatusChange),
    /// The entry is in a state the transition is not legal from.
    ///
    /// Expected under concurrent completion; the entry may already have
    /// progressed past the requested transition.
    Rejected {
        /// The status actually found.
        actual: ChunkSchedulingStatus,
    },
    /// The entry no longer exists.
    NotFound,
}

impl TransitionOutcome {
    /// Returns true if the transition was applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// Returns the delta if the transition was applied.
    #[must_use]
    pub const fn change(&self) -> Option<StatusChange> {
        match self {
            Self::Applied(change) => Some(*change),
            Self::Rejected { .. } | Self::NotFound => None,
        }
    }
}

/// Exclusive lease on one tracking key.
///
/// Held for the duration of a `modify` call; the underlying lock is
/// released on drop, including on error and cancellation paths.
#[derive(Debug)]
pub struct EntryLease {
    _guard: Option<OwnedMutexGuard<()>>,
}

impl EntryLease {
    /// Creates a lease backed by an owned mutex guard.
    #[must_use]
    pub fn from_guard(guard: OwnedMutexGuard<()>) -> Self {
        Self {
            _guard: Some(guard),
        }
    }

    /// Creates a lease with no backing lock.
    ///
    /// For store implementations whose per-key operations are serialized by
    /// other means.
    #[must_use]
    pub const fn detached() -> Self {
        Self { _guard: None }
    }
}

/// Jobs and chunks currently tracked for a sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOccupancy {
    /// Number of distinct jobs with live chunks.
    pub jobs: usize,
    /// Number of live chunks.
    pub chunks: usize,
}

/// Storage abstraction for the dependency-tracking map.
///
/// Implementations must provide:
/// - Safe concurrent access from every node without external coordination
/// - Atomic per-key transforms reporting status deltas
/// - The queries the scheduler depends on (find-by-status-and-sink is the
///   hot path)
///
/// ## Thread Safety
///
/// All methods are `Send + Sync` to support concurrent access from multiple
/// scheduler tasks.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    // --- Point operations ---

    /// Gets an entry by key.
    async fn get(&self, key: &TrackingKey) -> Result<Option<DependencyTracking>>;

    /// Returns true if the key is live.
    async fn contains(&self, key: &TrackingKey) -> Result<bool>;

    /// Inserts or replaces an entry, returning the resulting delta.
    async fn put(&self, entry: DependencyTracking) -> Result<StatusChange>;

    /// Removes an entry.
    ///
    /// Producer-index entries pointing at the removed key are dropped as
    /// part of the same operation. Returns `None` if the key was not live.
    async fn remove(&self, key: &TrackingKey) -> Result<Option<StatusChange>>;

    /// Removes every entry belonging to a job (job abort), returning the
    /// deltas of the removed entries.
    async fn remove_job(&self, job_id: JobId) -> Result<Vec<StatusChange>>;

    // --- Atomic per-key transforms ---

    /// Executes a function against the current value of an entry.
    ///
    /// Stamps `last_modified` after the mutator runs and writes the entry
    /// back. A no-op returning `None` if the entry was concurrently
    /// deleted. The returned delta covers any status change the mutator
    /// made.
    async fn with_entry(
        &self,
        key: &TrackingKey,
        mutator: EntryMutator,
    ) -> Result<Option<StatusChange>>;

    /// Unconditionally sets the status of an entry.
    ///
    /// Returns `None` if the entry was concurrently deleted.
    async fn transition(
        &self,
        key: &TrackingKey,
        to: ChunkSchedulingStatus,
    ) -> Result<Option<StatusChange>>;

    /// Sets the status of an entry if the transition is legal.
    ///
    /// Illegal transitions are discarded rather than corrupting state.
    async fn transition_checked(
        &self,
        key: &TrackingKey,
        to: ChunkSchedulingStatus,
    ) -> Result<TransitionOutcome>;

    /// Raises the priority of an entry if the given value is higher.
    ///
    /// Returns the entry's wait set when the priority was raised (for
    /// cascading), `None` when the entry is absent or already at least as
    /// urgent.
    async fn raise_priority(
        &self,
        key: &TrackingKey,
        priority: i32,
    ) -> Result<Option<BTreeSet<TrackingKey>>>;

    /// Unions blockers into an entry's wait set, blocking it.
    ///
    /// Returns `None` if the entry is absent; the delta reflects a
    /// transition into `BLOCKED` when the resulting wait set is non-empty.
    async fn add_waiting_on(
        &self,
        key: &TrackingKey,
        blockers: BTreeSet<TrackingKey>,
    ) -> Result<Option<StatusChange>>;

    /// Removes a single blocker from one entry's wait set.
    ///
    /// A `BLOCKED` entry whose wait set empties transitions to
    /// `QUEUED_FOR_PROCESSING`; the delta reflects that transition.
    async fn remove_waiting_on(
        &self,
        key: &TrackingKey,
        blocker: &TrackingKey,
    ) -> Result<Option<StatusChange>>;

    /// Removes a completed chunk from every wait set referencing it.
    ///
    /// Returns the deltas of the entries this unblocked (`BLOCKED` →
    /// `QUEUED_FOR_PROCESSING`); entries that merely shrank produce none.
    async fn prune_blocker(&self, blocker: &TrackingKey) -> Result<Vec<StatusChange>>;

    // --- Queries ---

    /// Entries in a status, optionally scoped to one sink.
    ///
    /// Ordered priority-descending, then by key — best-effort dispatch
    /// order, no stronger guarantee.
    async fn find_by_status(
        &self,
        status: ChunkSchedulingStatus,
        sink_id: Option<SinkId>,
        limit: Option<usize>,
    ) -> Result<Vec<DependencyTracking>>;

    /// Entries in a status last modified before the cutoff.
    async fn find_stale(
        &self,
        status: ChunkSchedulingStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DependencyTracking>>;

    /// Every entry of a job, in chunk order.
    async fn job_snapshot(&self, job_id: JobId) -> Result<Vec<DependencyTracking>>;

    /// Keys of entries whose wait set contains the given blocker.
    async fn waiting_on(&self, blocker: &TrackingKey) -> Result<Vec<TrackingKey>>;

    /// Entries of one sink/submitter whose match-key hashes overlap the
    /// given set — the full-accuracy dependency discovery path.
    async fn overlapping(
        &self,
        sink_id: SinkId,
        submitter: SubmitterId,
        hashes: &[i32],
    ) -> Result<Vec<DependencyTracking>>;

    /// Keys of one sink's entries belonging to a job or carrying one of the
    /// given match keys — termination-barrier discovery.
    async fn barrier_members(
        &self,
        sink_id: SinkId,
        job_id: JobId,
        keys: &BTreeSet<String>,
    ) -> Result<Vec<TrackingKey>>;

    /// Sinks with at least one entry in the given status.
    async fn active_sinks(&self, status: ChunkSchedulingStatus) -> Result<BTreeSet<SinkId>>;

    /// Whole-map aggregation of per-sink, per-status counts.
    ///
    /// Scoped to the given sinks when provided; the basis for counter
    /// recounts.
    async fn status_counts(&self, sink_ids: Option<&BTreeSet<SinkId>>) -> Result<StatusCounts>;

    /// Every job with live entries.
    async fn job_ids(&self) -> Result<BTreeSet<JobId>>;

    /// Job/chunk occupancy of one sink.
    async fn job_count(&self, sink_id: SinkId) -> Result<JobOccupancy>;

    /// Number of live entries.
    async fn len(&self) -> Result<usize>;

    // --- Last-producer index ---

    /// Records an entry as the most recent producer for a descriptor.
    async fn record_producer(&self, wait_for: WaitFor, key: TrackingKey) -> Result<()>;

    /// Returns the most recent producer for a descriptor, if any.
    async fn last_producer(&self, wait_for: &WaitFor) -> Result<Option<TrackingKey>>;

    /// Recomputes the index from live entries and installs the result.
    ///
    /// For each descriptor the most recently admitted live entry wins.
    /// Returns the rebuilt index.
    async fn rebuild_producer_index(&self) -> Result<HashMap<WaitFor, TrackingKey>>;

    /// Returns a snapshot of the current index, for audit.
    async fn producer_index_snapshot(&self) -> Result<HashMap<WaitFor, TrackingKey>>;

    // --- Lease and lifecycle ---

    /// Acquires an exclusive per-key lease with bounded wait.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::LockTimeout`] when the lease cannot
    /// be acquired within the timeout.
    async fn lock_entry(&self, key: &TrackingKey, timeout: Duration) -> Result<EntryLease>;

    /// Re-reads through backing storage, where one exists.
    async fn reload(&self) -> Result<()>;
}
