//! Per-sink occupancy counters and submit modes.
//!
//! The counters are a cache of store content, maintained incrementally from
//! [`StatusChange`] deltas and recomputed on demand by the service's
//! recount operation. They are never a second source of truth: drift from a
//! missed delta is corrected by the next recount, never treated as fatal.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tracking::{ChunkSchedulingStatus, StatusChange};

/// How chunks reach a sink's queue for one pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitMode {
    /// Chunks are enqueued directly as they become eligible.
    Direct,
    /// The queue filled up; the bulk poll loop owns enqueueing until it
    /// drains below the transition mark.
    Bulk,
}

impl Default for SubmitMode {
    fn default() -> Self {
        Self::Direct
    }
}

/// Occupancy counters for one sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkCounters {
    counts: HashMap<ChunkSchedulingStatus, usize>,
    /// Submit mode for the processing phase.
    pub processing_mode: SubmitMode,
    /// Submit mode for the delivery phase.
    pub delivery_mode: SubmitMode,
}

impl SinkCounters {
    /// Creates empty counters in direct-submit mode.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates counters from a recounted status histogram, in bulk mode so
    /// the poll loop re-drains anything the direct path missed.
    #[must_use]
    pub fn from_counts(counts: HashMap<ChunkSchedulingStatus, usize>) -> Self {
        Self {
            counts,
            processing_mode: SubmitMode::Bulk,
            delivery_mode: SubmitMode::Bulk,
        }
    }

    /// Returns the number of chunks in the given status.
    #[must_use]
    pub fn count(&self, status: ChunkSchedulingStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Returns the total number of tracked chunks for the sink.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Applies a mutation delta.
    ///
    /// Decrements saturate at zero: a missed increment must not drive a
    /// counter negative, it is repaired by the next recount instead.
    pub fn apply(&mut self, change: &StatusChange) {
        if !change.is_effective() {
            return;
        }
        if let Some(from) = change.from {
            let slot = self.counts.entry(from).or_insert(0);
            *slot = slot.saturating_sub(1);
        }
        if let Some(to) = change.to {
            *self.counts.entry(to).or_insert(0) += 1;
        }
    }

    /// Returns the submit mode for the phase feeding the given status.
    #[must_use]
    pub fn mode_for(&self, status: ChunkSchedulingStatus) -> SubmitMode {
        match status {
            ChunkSchedulingStatus::Delivering | ChunkSchedulingStatus::QueuedForDelivery => {
                self.delivery_mode
            }
            _ => self.processing_mode,
        }
    }

    /// Sets the submit mode for the phase feeding the given status.
    pub fn set_mode_for(&mut self, status: ChunkSchedulingStatus, mode: SubmitMode) {
        match status {
            ChunkSchedulingStatus::Delivering | ChunkSchedulingStatus::QueuedForDelivery => {
                self.delivery_mode = mode;
            }
            _ => self.processing_mode = mode,
        }
    }
}
