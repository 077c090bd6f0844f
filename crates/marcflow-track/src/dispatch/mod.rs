//! Chunk dispatch abstraction.
//!
//! This module provides:
//!
//! - [`ChunkEnvelope`]: Serializable dispatch payload
//! - [`ChunkDispatcher`]: Trait for handing chunks to the processing and
//!   delivery queues
//! - [`memory::InMemoryDispatcher`]: In-memory queue for testing
//!
//! The transport behind the trait (message broker, local worker pool) is
//! out of scope here; the scheduler only needs a seam that accepts fully
//! resolved chunks per pipeline phase.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marcflow_core::{SinkId, SubmitterId};

use crate::error::Result;
use crate::tracking::DependencyTracking;
use crate::tracking_key::TrackingKey;

/// Pipeline phase a chunk is dispatched into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPhase {
    /// Hand the chunk to a processor worker.
    Processing,
    /// Hand the resolved chunk to its sink.
    Delivery,
}

impl std::fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Delivery => write!(f, "delivery"),
        }
    }
}

/// Envelope for a chunk to be dispatched.
///
/// Carries the identity triplet and scheduling metadata; the chunk payload
/// itself travels through the job store, keyed by the same identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEnvelope {
    /// Chunk identity.
    pub key: TrackingKey,
    /// Destination sink.
    pub sink_id: SinkId,
    /// Submitter of the owning job.
    pub submitter: SubmitterId,
    /// Dispatch priority at enqueue time.
    pub priority: i32,
    /// Attempt number (0 for the first dispatch, counting resends).
    pub attempt: u32,
    /// When the envelope was created.
    pub enqueued_at: DateTime<Utc>,
}

impl ChunkEnvelope {
    /// Builds an envelope from a tracking entry.
    #[must_use]
    pub fn from_entry(entry: &DependencyTracking) -> Self {
        Self {
            key: entry.key,
            sink_id: entry.sink_id,
            submitter: entry.submitter,
            priority: entry.priority,
            attempt: entry.retries,
            enqueued_at: Utc::now(),
        }
    }
}

/// Queue seam between the scheduler and the pipeline workers.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync` to support concurrent access from multiple
/// scheduler tasks.
#[async_trait]
pub trait ChunkDispatcher: Send + Sync {
    /// Enqueues a chunk for its processing phase.
    async fn dispatch_processing(&self, envelope: ChunkEnvelope) -> Result<()>;

    /// Enqueues a resolved chunk for delivery to its sink.
    async fn dispatch_delivery(&self, envelope: ChunkEnvelope) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::DependencyTracking;
    use marcflow_core::{ChunkId, JobId};

    #[test]
    fn envelope_carries_entry_metadata() {
        let entry = DependencyTracking::new(
            TrackingKey::new(JobId::new(3), ChunkId::new(1)),
            SinkId::new(5),
            SubmitterId::new(870_970),
        )
        .with_priority(7);

        let envelope = ChunkEnvelope::from_entry(&entry);
        assert_eq!(envelope.key, entry.key);
        assert_eq!(envelope.sink_id, entry.sink_id);
        assert_eq!(envelope.priority, 7);
        assert_eq!(envelope.attempt, 0);
    }

    #[test]
    fn phase_display() {
        assert_eq!(DispatchPhase::Processing.to_string(), "processing");
        assert_eq!(DispatchPhase::Delivery.to_string(), "delivery");
    }
}
