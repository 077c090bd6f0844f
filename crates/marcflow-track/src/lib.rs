//! # marcflow-track
//!
//! Chunk dependency tracking and scheduling for the marcflow bibliographic
//! job pipeline.
//!
//! Jobs are split into ordered chunks of records; chunks flow through
//! partitioning, processing and delivery stages via per-sink queues. This
//! crate is the cluster-wide component that decides, for every chunk of
//! every job, whether it may be dispatched now or must wait:
//!
//! - **Sequence analysis**: Chunks sharing a match key are processed in
//!   submission order; no two chunks with a common key run concurrently
//! - **Admission control**: A bounded number of in-flight chunks per sink
//!   and pipeline phase
//! - **Priority boosting**: High-priority wait chains are escalated across
//!   job boundaries so they are not starved behind bulk traffic
//! - **Self-healing**: Counter recounts and blocked-chunk rechecks converge
//!   the tracking state after node failures
//!
//! ## Core Concepts
//!
//! - **Tracking entry**: One [`tracking::DependencyTracking`] record per
//!   live chunk, keyed by [`tracking_key::TrackingKey`]
//! - **Wait set**: The frontier of chunks an entry must wait for; kept
//!   minimal by dependency reduction
//! - **Sink counters**: A per-sink cache of per-status occupancy, maintained
//!   from mutation deltas and recomputable from map truth at any time
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use marcflow_core::{JobId, ChunkId, Priority, SinkId, SubmitterId};
//! use marcflow_track::error::Result;
//! use marcflow_track::service::{DependencyTrackingService, ServiceConfig};
//! use marcflow_track::store::memory::InMemoryTrackingStore;
//! use marcflow_track::tracking::DependencyTracking;
//! use marcflow_track::tracking_key::TrackingKey;
//!
//! # async fn example() -> Result<()> {
//! let store = Arc::new(InMemoryTrackingStore::new());
//! let service = DependencyTrackingService::new(store, ServiceConfig::default());
//!
//! let entry = DependencyTracking::new(
//!     TrackingKey::new(JobId::new(1), ChunkId::new(0)),
//!     SinkId::new(5),
//!     SubmitterId::new(870_970),
//! )
//! .with_match_keys(["faust:1234".to_string()])
//! .with_priority(Priority::Normal.value());
//!
//! service.add_and_build_dependencies(entry, None).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod counters;
pub mod dispatch;
pub mod error;
pub mod keygen;
pub mod metrics;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod tracking;
pub mod tracking_key;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::counters::{SinkCounters, SubmitMode};
    pub use crate::dispatch::{ChunkDispatcher, ChunkEnvelope, DispatchPhase};
    pub use crate::error::{Error, Result};
    pub use crate::keygen::{DefaultKeyGenerator, KeyGenerator, NoopKeyGenerator};
    pub use crate::scheduler::{ChunkScheduler, SchedulerConfig};
    pub use crate::service::{DependencyTrackingService, ServiceConfig};
    pub use crate::store::{EntryLease, TrackingStore};
    pub use crate::tracking::{ChunkSchedulingStatus, DependencyTracking, StatusChange};
    pub use crate::tracking_key::{TrackingKey, WaitFor};
}
