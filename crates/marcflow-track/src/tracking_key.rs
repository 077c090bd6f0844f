//! Chunk identity and wait-for descriptors.
//!
//! `TrackingKey` is the map key of the dependency store: the `(job, chunk)`
//! pair that identifies one scheduled chunk cluster-wide. `WaitFor` keys the
//! last-producer index used for O(1) dependency discovery.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use marcflow_core::{match_hash, ChunkId, JobId, SinkId, SubmitterId};

/// Identity of a scheduled chunk.
///
/// Value-based equality and hashing; total order by `(job_id, chunk_id)`.
/// The pair is assigned by the job store at partitioning time and never
/// changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingKey {
    /// The owning job.
    pub job_id: JobId,
    /// The chunk ordinal within the job.
    pub chunk_id: ChunkId,
}

impl TrackingKey {
    /// Creates a tracking key.
    #[must_use]
    pub const fn new(job_id: JobId, chunk_id: ChunkId) -> Self {
        Self { job_id, chunk_id }
    }

    /// Returns the `job/chunk` identifier used in log output.
    #[must_use]
    pub fn to_chunk_identifier(&self) -> String {
        format!("{}/{}", self.job_id, self.chunk_id)
    }
}

impl PartialOrd for TrackingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TrackingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.job_id
            .cmp(&other.job_id)
            .then_with(|| self.chunk_id.cmp(&other.chunk_id))
    }
}

impl fmt::Display for TrackingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.job_id, self.chunk_id)
    }
}

/// Descriptor keying the last-producer index.
///
/// Sequence analysis only relates chunks of the same sink and submitter, so
/// both participate in the key alongside the match-key hash. One `WaitFor`
/// maps to the most recently admitted chunk carrying that match key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitFor {
    /// The destination sink.
    pub sink_id: SinkId,
    /// The submitter the chunk's job originates from.
    pub submitter: SubmitterId,
    /// Stable hash of the match key.
    pub hash: i32,
}

impl WaitFor {
    /// Creates a wait-for descriptor from a raw hash.
    #[must_use]
    pub const fn new(sink_id: SinkId, submitter: SubmitterId, hash: i32) -> Self {
        Self {
            sink_id,
            submitter,
            hash,
        }
    }

    /// Creates a wait-for descriptor by hashing a match key.
    #[must_use]
    pub fn for_key(sink_id: SinkId, submitter: SubmitterId, key: &str) -> Self {
        Self::new(sink_id, submitter, match_hash(key))
    }
}

impl fmt::Display for WaitFor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{:x}", self.sink_id, self.submitter, self.hash)
    }
}
