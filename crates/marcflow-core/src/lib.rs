//! # marcflow-core
//!
//! Core abstractions for the marcflow bibliographic job pipeline.
//!
//! This crate provides the foundational types used across all marcflow
//! components:
//!
//! - **Identifiers**: Strongly-typed IDs for jobs, chunks, sinks, and
//!   submitters
//! - **Priority**: Job priority levels driving dispatch order and boosting
//! - **Match-key hashing**: The version-stable 32-bit hash used for
//!   sequence-analysis dependency probing
//! - **Error Types**: Shared error definitions and result types
//!
//! ## Crate Boundary
//!
//! `marcflow-core` is the **only** crate allowed to define shared
//! primitives. Identifier widths are part of the cluster wire contract: the
//! `(job, chunk, sink)` triplet must be stable across node versions sharing
//! one cluster, so all identifiers are fixed-width 32-bit values.
//!
//! ## Example
//!
//! ```rust
//! use marcflow_core::prelude::*;
//!
//! let job = JobId::new(42);
//! let chunk = ChunkId::new(0);
//! assert_eq!(job.to_string(), "42");
//! assert!(Priority::High > Priority::Normal);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod hash;
pub mod id;
pub mod priority;

pub use error::{Error, Result};
pub use hash::match_hash;
pub use id::{ChunkId, JobId, SinkId, SubmitterId};
pub use priority::Priority;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::hash::match_hash;
    pub use crate::id::{ChunkId, JobId, SinkId, SubmitterId};
    pub use crate::priority::Priority;
}
