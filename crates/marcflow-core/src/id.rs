//! Strongly-typed identifiers for marcflow entities.
//!
//! All identifiers in marcflow are:
//! - **Strongly typed**: Prevents mixing up different ID types at compile time
//! - **Fixed-width**: 32-bit signed integers, stable across node versions
//!   sharing one cluster
//! - **Externally assigned**: Jobs and chunks are numbered by the job store;
//!   this crate never generates identifiers
//!
//! # Example
//!
//! ```rust
//! use marcflow_core::id::{ChunkId, JobId};
//!
//! let job = JobId::new(1001);
//! let chunk = ChunkId::new(0);
//!
//! // IDs are different types - this won't compile:
//! // let wrong: JobId = chunk;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            /// Creates an identifier from its raw value.
            #[must_use]
            pub const fn new(value: i32) -> Self {
                Self(value)
            }

            /// Returns the raw identifier value.
            #[must_use]
            pub const fn value(&self) -> i32 {
                self.0
            }
        }

        impl From<i32> for $name {
            fn from(value: i32) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                s.parse::<i32>().map(Self).map_err(|e| Error::InvalidId {
                    message: format!(
                        concat!("invalid ", stringify!($name), " '{}': {}"),
                        s, e
                    ),
                })
            }
        }
    };
}

define_id! {
    /// A unique identifier for a job.
    ///
    /// Jobs are the top-level unit of work submitted to the pipeline; every
    /// chunk belongs to exactly one job.
    JobId
}

define_id! {
    /// The ordinal of a chunk within its job.
    ///
    /// Chunks are numbered from zero in submission order; ordering
    /// constraints between chunks of the same job rely on this numbering.
    ChunkId
}

define_id! {
    /// A unique identifier for a delivery sink.
    ///
    /// The sink is the admission-control bucket: queue capacity limits and
    /// occupancy counters are kept per sink.
    SinkId
}

define_id! {
    /// The submitter (data provider) a job originates from.
    ///
    /// Sequence analysis only relates chunks of the same sink and submitter,
    /// so the submitter number participates in dependency probing.
    SubmitterId
}
