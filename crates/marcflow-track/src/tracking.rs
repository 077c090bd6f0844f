//! Tracking entry state and lifecycle management.
//!
//! This module provides:
//! - `ChunkSchedulingStatus`: The state machine a chunk moves through
//! - `DependencyTracking`: The per-chunk scheduling record
//! - `StatusChange`: The delta record emitted by every store mutation
//! - `CapacityConfig`: Per-status admission bounds

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marcflow_core::{match_hash, SinkId, SubmitterId};

use crate::tracking_key::{TrackingKey, WaitFor};

/// Scheduling state machine for a chunk.
///
/// States follow the pipeline phases:
/// ```text
///                    deps at creation
/// ┌──────────────────────┐        ┌─────────┐
/// │ READY_FOR_PROCESSING │        │ BLOCKED │
/// └──────────────────────┘        └─────────┘
///            │ admission               │ last blocker removed
///            ▼                         │
/// ┌───────────────────────┐◄───────────┘
/// │ QUEUED_FOR_PROCESSING │
/// └───────────────────────┘
///            │ worker picks up
///            ▼
///      ┌────────────┐  done   ┌─────────────────────┐
///      │ PROCESSING │────────►│ QUEUED_FOR_DELIVERY │
///      └────────────┘         └─────────────────────┘
///                                        │ admission
///                                        ▼
///                                 ┌────────────┐  delivered
///                                 │ DELIVERING │────────────► removed
///                                 └────────────┘
/// ```
///
/// Completion (`DONE`) is modeled as removal from the store; it is terminal
/// and never stored. Each queued/active status has a *resend* edge back to
/// an earlier status, used when a dispatch message is presumed lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkSchedulingStatus {
    /// Dependencies resolved, awaiting processing-queue admission.
    ReadyForProcessing,
    /// On the processing queue for its sink.
    QueuedForProcessing,
    /// Waiting for one or more other chunks.
    Blocked,
    /// A processor worker is transforming the chunk.
    Processing,
    /// Processed, awaiting delivery-queue admission.
    QueuedForDelivery,
    /// On the delivery queue for its sink.
    Delivering,
}

impl ChunkSchedulingStatus {
    /// Returns the status a lost or failed chunk is resent from, if any.
    #[must_use]
    pub const fn resend(&self) -> Option<Self> {
        match self {
            Self::QueuedForProcessing => Some(Self::ReadyForProcessing),
            Self::Processing => Some(Self::QueuedForProcessing),
            Self::Delivering => Some(Self::QueuedForDelivery),
            Self::ReadyForProcessing | Self::Blocked | Self::QueuedForDelivery => None,
        }
    }

    /// Returns the per-sink admission bound for this status, if bounded.
    #[must_use]
    pub const fn capacity_bound(&self, config: &CapacityConfig) -> Option<usize> {
        match self {
            Self::QueuedForProcessing => Some(config.processing_queue),
            Self::Delivering => Some(config.delivery_queue),
            Self::ReadyForProcessing | Self::Blocked | Self::Processing | Self::QueuedForDelivery => {
                None
            }
        }
    }

    /// Returns true if the transition from self to target is valid.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::ReadyForProcessing => {
                matches!(target, Self::QueuedForProcessing | Self::Blocked)
            }
            Self::Blocked => matches!(target, Self::QueuedForProcessing),
            Self::QueuedForProcessing => {
                matches!(target, Self::Processing | Self::ReadyForProcessing)
            }
            Self::Processing => {
                matches!(target, Self::QueuedForDelivery | Self::QueuedForProcessing)
            }
            Self::QueuedForDelivery => matches!(target, Self::Delivering),
            Self::Delivering => matches!(target, Self::QueuedForDelivery),
        }
    }

    /// Returns all valid target states from the current state.
    #[must_use]
    pub fn valid_transitions(&self) -> Vec<Self> {
        match self {
            Self::ReadyForProcessing => vec![Self::QueuedForProcessing, Self::Blocked],
            Self::Blocked => vec![Self::QueuedForProcessing],
            Self::QueuedForProcessing => vec![Self::Processing, Self::ReadyForProcessing],
            Self::Processing => vec![Self::QueuedForDelivery, Self::QueuedForProcessing],
            Self::QueuedForDelivery => vec![Self::Delivering],
            Self::Delivering => vec![Self::QueuedForDelivery],
        }
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::ReadyForProcessing => "ready_for_processing",
            Self::QueuedForProcessing => "queued_for_processing",
            Self::Blocked => "blocked",
            Self::Processing => "processing",
            Self::QueuedForDelivery => "queued_for_delivery",
            Self::Delivering => "delivering",
        }
    }
}

impl Default for ChunkSchedulingStatus {
    fn default() -> Self {
        Self::ReadyForProcessing
    }
}

impl std::fmt::Display for ChunkSchedulingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadyForProcessing => write!(f, "READY_FOR_PROCESSING"),
            Self::QueuedForProcessing => write!(f, "QUEUED_FOR_PROCESSING"),
            Self::Blocked => write!(f, "BLOCKED"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::QueuedForDelivery => write!(f, "QUEUED_FOR_DELIVERY"),
            Self::Delivering => write!(f, "DELIVERING"),
        }
    }
}

/// Per-sink admission bounds for the capacity-limited statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityConfig {
    /// Maximum chunks on a sink's processing queue.
    pub processing_queue: usize,
    /// Maximum chunks on a sink's delivery queue.
    pub delivery_queue: usize,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            processing_queue: 1000,
            delivery_queue: 1000,
        }
    }
}

impl CapacityConfig {
    /// Creates bounds with the same limit for both queues.
    #[must_use]
    pub const fn uniform(limit: usize) -> Self {
        Self {
            processing_queue: limit,
            delivery_queue: limit,
        }
    }
}

/// Delta record describing one store mutation.
///
/// Consumed by the sink-counter cache: `from == None` is an insert,
/// `to == None` a removal, and both set a status transition. Counters are a
/// cache of map content; these deltas keep them current between recounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    /// The mutated entry.
    pub key: TrackingKey,
    /// The entry's sink.
    pub sink_id: SinkId,
    /// Status before the mutation, if the entry existed.
    pub from: Option<ChunkSchedulingStatus>,
    /// Status after the mutation, if the entry still exists.
    pub to: Option<ChunkSchedulingStatus>,
}

impl StatusChange {
    /// Delta for a newly inserted entry.
    #[must_use]
    pub const fn inserted(key: TrackingKey, sink_id: SinkId, to: ChunkSchedulingStatus) -> Self {
        Self {
            key,
            sink_id,
            from: None,
            to: Some(to),
        }
    }

    /// Delta for a removed entry.
    #[must_use]
    pub const fn removed(key: TrackingKey, sink_id: SinkId, from: ChunkSchedulingStatus) -> Self {
        Self {
            key,
            sink_id,
            from: Some(from),
            to: None,
        }
    }

    /// Delta for a status transition on a live entry.
    #[must_use]
    pub const fn transitioned(
        key: TrackingKey,
        sink_id: SinkId,
        from: ChunkSchedulingStatus,
        to: ChunkSchedulingStatus,
    ) -> Self {
        Self {
            key,
            sink_id,
            from: Some(from),
            to: Some(to),
        }
    }

    /// Returns true if the delta changes counter state.
    #[must_use]
    pub fn is_effective(&self) -> bool {
        self.from != self.to
    }
}

/// Per-chunk scheduling record.
///
/// One entry exists per live chunk; removal is the only way a key leaves
/// the store. The entry is mutated exclusively through the store's atomic
/// per-key operations so that every change produces a correct counter
/// delta under concurrent writers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyTracking {
    /// Chunk identity; set at creation, never changes.
    pub key: TrackingKey,
    /// Destination sink; the admission-control bucket.
    pub sink_id: SinkId,
    /// Current scheduling status.
    pub status: ChunkSchedulingStatus,
    /// Dispatch priority; only ever raised after creation.
    pub priority: i32,
    /// Submitter number; participates in dependency probing.
    pub submitter: SubmitterId,
    /// Sequence-analysis match keys, computed once at partitioning.
    match_keys: BTreeSet<String>,
    /// Stable hashes of `match_keys`; derived cache, never authoritative.
    hashes: Vec<i32>,
    /// Chunks this chunk must wait for; empty means eligible for dispatch.
    pub waiting_on: BTreeSet<TrackingKey>,
    /// Stamped on every mutation; drives stale-entry detection.
    pub last_modified: DateTime<Utc>,
    /// Times the entry has traveled a resend edge.
    pub retries: u32,
}

impl DependencyTracking {
    /// Creates a new tracking entry in `READY_FOR_PROCESSING` with no match
    /// keys and default priority.
    #[must_use]
    pub fn new(key: TrackingKey, sink_id: SinkId, submitter: SubmitterId) -> Self {
        Self {
            key,
            sink_id,
            status: ChunkSchedulingStatus::ReadyForProcessing,
            priority: marcflow_core::Priority::Normal.value(),
            submitter,
            match_keys: BTreeSet::new(),
            hashes: Vec::new(),
            waiting_on: BTreeSet::new(),
            last_modified: Utc::now(),
            retries: 0,
        }
    }

    /// Sets the match keys, recomputing the hash cache.
    #[must_use]
    pub fn with_match_keys(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.set_match_keys(keys.into_iter().collect());
        self
    }

    /// Sets the initial priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the initial status.
    #[must_use]
    pub const fn with_status(mut self, status: ChunkSchedulingStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns the sequence-analysis match keys.
    #[must_use]
    pub const fn match_keys(&self) -> &BTreeSet<String> {
        &self.match_keys
    }

    /// Returns the stable hashes of the match keys.
    #[must_use]
    pub fn hashes(&self) -> &[i32] {
        &self.hashes
    }

    /// Replaces the match keys and recomputes the hash cache.
    pub fn set_match_keys(&mut self, keys: BTreeSet<String>) {
        self.hashes = keys.iter().map(|k| match_hash(k)).collect();
        self.match_keys = keys;
    }

    /// Replaces the wait set.
    ///
    /// The status follows the wait set: a non-empty set blocks the chunk,
    /// an empty one leaves the creation-time status untouched.
    pub fn set_waiting_on(&mut self, waiting_on: BTreeSet<TrackingKey>) {
        if !waiting_on.is_empty() {
            self.status = ChunkSchedulingStatus::Blocked;
        }
        self.waiting_on = waiting_on;
    }

    /// Returns the wait-for descriptors for this entry's match keys.
    #[must_use]
    pub fn wait_for_keys(&self) -> Vec<WaitFor> {
        self.hashes
            .iter()
            .map(|&hash| WaitFor::new(self.sink_id, self.submitter, hash))
            .collect()
    }

    /// Stamps the entry as modified now.
    pub fn touch(&mut self) {
        self.last_modified = Utc::now();
    }

    /// Follows the status's resend edge, counting the retry.
    ///
    /// Returns the new retry count, or `None` when the current status has
    /// no resend edge.
    pub fn resend(&mut self) -> Option<u32> {
        let target = self.status.resend()?;
        self.status = target;
        self.retries += 1;
        Some(self.retries)
    }

    /// Returns true if the entry has been idle since before `cutoff`.
    #[must_use]
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_modified < cutoff
    }
}
