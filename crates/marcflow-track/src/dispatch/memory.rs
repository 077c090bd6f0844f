//! In-memory chunk dispatcher for testing.
//!
//! This module provides [`InMemoryDispatcher`], a simple in-memory
//! implementation of the [`ChunkDispatcher`] trait suitable for testing and
//! development.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No persistence, no distribution
//! - **Single-process only**: Envelopes are not visible across processes

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{ChunkDispatcher, ChunkEnvelope, DispatchPhase};
use crate::error::{Error, Result};

/// Internal queue state protected by a single lock.
#[derive(Debug, Default)]
struct QueueState {
    processing: VecDeque<ChunkEnvelope>,
    delivery: VecDeque<ChunkEnvelope>,
}

/// In-memory dispatcher capturing envelopes per phase.
#[derive(Debug, Default)]
pub struct InMemoryDispatcher {
    state: RwLock<QueueState>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("dispatcher lock poisoned")
}

impl InMemoryDispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the next envelope for a phase.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn take(&self, phase: DispatchPhase) -> Result<Option<ChunkEnvelope>> {
        let mut state = self.state.write().map_err(poison_err)?;
        let entry = match phase {
            DispatchPhase::Processing => state.processing.pop_front(),
            DispatchPhase::Delivery => state.delivery.pop_front(),
        };
        drop(state);
        Ok(entry)
    }

    /// Returns all enqueued envelopes for a phase.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn drain(&self, phase: DispatchPhase) -> Result<Vec<ChunkEnvelope>> {
        let mut state = self.state.write().map_err(poison_err)?;
        let drained = match phase {
            DispatchPhase::Processing => state.processing.drain(..).collect(),
            DispatchPhase::Delivery => state.delivery.drain(..).collect(),
        };
        drop(state);
        Ok(drained)
    }

    /// Returns the queue depth for a phase.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn depth(&self, phase: DispatchPhase) -> Result<usize> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(match phase {
            DispatchPhase::Processing => state.processing.len(),
            DispatchPhase::Delivery => state.delivery.len(),
        })
    }
}

#[async_trait]
impl ChunkDispatcher for InMemoryDispatcher {
    async fn dispatch_processing(&self, envelope: ChunkEnvelope) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.processing.push_back(envelope);
        drop(state);
        Ok(())
    }

    async fn dispatch_delivery(&self, envelope: ChunkEnvelope) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.delivery.push_back(envelope);
        drop(state);
        Ok(())
    }
}
