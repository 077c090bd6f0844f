//! Job priority levels.
//!
//! Priorities drive dispatch order within a sink and the cross-job boost
//! cascade: a high-priority chunk raises the priority of every chunk it
//! waits on (transitively) so its prerequisites are not starved behind
//! unrelated low-priority backlogs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Priority level of a job and its chunks.
///
/// The numeric values form part of the cluster contract and must not be
/// renumbered; tracking entries carry the raw value, not the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Bulk/batch work; never triggers a boost cascade.
    Low,
    /// The default for interactively submitted jobs.
    Normal,
    /// Urgent work; boosts everything in its wait chain.
    High,
}

impl Priority {
    /// Returns the numeric value carried on tracking entries.
    #[must_use]
    pub const fn value(&self) -> i32 {
        match self {
            Self::Low => 1,
            Self::Normal => 4,
            Self::High => 7,
        }
    }

    /// Returns the named level for an exact numeric value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not match a named level.
    pub fn from_value(value: i32) -> Result<Self> {
        match value {
            1 => Ok(Self::Low),
            4 => Ok(Self::Normal),
            7 => Ok(Self::High),
            _ => Err(Error::InvalidPriority { value }),
        }
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_label())
    }
}
