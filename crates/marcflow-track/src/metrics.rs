//! Observability metrics for dependency tracking.
//!
//! Exposed via the `metrics` crate facade; the embedding process decides
//! which exporter to install.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `marcflow_chunk_transitions_total` | Counter | `from`, `to` | Scheduling status transitions |
//! | `marcflow_chunks_blocked` | Gauge | `sink` | Blocked chunks per sink |
//! | `marcflow_chunks_unblocked_total` | Counter | `path` | Chunks released, by release path |
//! | `marcflow_sink_recounts_total` | Counter | - | Counter recount passes |
//! | `marcflow_chunk_resends_total` | Counter | - | Stale chunks resent |

use metrics::{counter, gauge};

use marcflow_core::SinkId;

use crate::tracking::StatusChange;

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Scheduling status transitions.
    pub const TRANSITIONS_TOTAL: &str = "marcflow_chunk_transitions_total";
    /// Gauge: Blocked chunks per sink.
    pub const CHUNKS_BLOCKED: &str = "marcflow_chunks_blocked";
    /// Counter: Chunks released from their wait set.
    pub const UNBLOCKED_TOTAL: &str = "marcflow_chunks_unblocked_total";
    /// Counter: Counter recount passes.
    pub const RECOUNTS_TOTAL: &str = "marcflow_sink_recounts_total";
    /// Counter: Stale chunks resent.
    pub const RESENDS_TOTAL: &str = "marcflow_chunk_resends_total";
}

/// Metrics recorder for the tracking service.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackMetrics;

impl TrackMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records a mutation delta as a transition.
    pub fn record_change(&self, change: &StatusChange) {
        if !change.is_effective() {
            return;
        }
        let from = change.from.map_or("none", |s| s.as_label());
        let to = change.to.map_or("done", |s| s.as_label());
        counter!(names::TRANSITIONS_TOTAL, "from" => from, "to" => to).increment(1);
    }

    /// Updates the blocked gauge for one sink.
    pub fn set_blocked(&self, sink_id: SinkId, blocked: usize) {
        let value = u32::try_from(blocked).unwrap_or(u32::MAX);
        gauge!(names::CHUNKS_BLOCKED, "sink" => sink_id.to_string()).set(f64::from(value));
    }

    /// Records chunks released from their wait set.
    pub fn record_unblocked(&self, path: &'static str, count: usize) {
        counter!(names::UNBLOCKED_TOTAL, "path" => path).increment(count as u64);
    }

    /// Records a counter recount pass.
    pub fn record_recount(&self) {
        counter!(names::RECOUNTS_TOTAL).increment(1);
    }

    /// Records a stale chunk resend.
    pub fn record_resend(&self) {
        counter!(names::RESENDS_TOTAL).increment(1);
    }
}
