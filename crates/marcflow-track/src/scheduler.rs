//! Chunk scheduling as chunks pass through partitioning, processing and
//! delivery.
//!
//! Two submit paths exist per sink and phase:
//!
//! - **Direct**: eligible chunks are enqueued as scheduling events arrive
//!   (the default).
//! - **Bulk**: once a sink's queue fills to its admission bound, the sink
//!   flips to bulk mode and [`ChunkScheduler::poll_sink`] owns enqueueing
//!   until the queue drains below the transition mark.
//!
//! [`ChunkScheduler::sweep`] runs on a slower cadence as the correctness
//! backstop: it rechecks blocked chunks against vanished blockers and
//! resends stale entries within the retry budget.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use marcflow_core::{ChunkId, JobId, Priority, SinkId, SubmitterId};

use crate::counters::SubmitMode;
use crate::dispatch::{ChunkDispatcher, ChunkEnvelope};
use crate::error::Result;
use crate::keygen::KeyGenerator;
use crate::metrics::TrackMetrics;
use crate::service::DependencyTrackingService;
use crate::tracking::{ChunkSchedulingStatus, DependencyTracking};
use crate::tracking_key::TrackingKey;

/// Configuration for the scheduler loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Age after which a queued or processing chunk counts as stale.
    pub stale_processing: Duration,
    /// Age after which a delivering chunk counts as stale.
    pub stale_delivery: Duration,
    /// Resend budget per chunk; stale entries beyond it are left for
    /// operator intervention.
    pub max_retries: u32,
    /// Queue depth below which a bulk-mode sink flips back to direct
    /// submit.
    pub transition_mark: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stale_processing: Duration::from_secs(3600),
            stale_delivery: Duration::from_secs(3600),
            max_retries: 1,
            transition_mark: 50,
        }
    }
}

/// Job-level scheduling parameters, supplied by the job store.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    /// The job being scheduled.
    pub job_id: JobId,
    /// Destination sink for the job's output.
    pub sink_id: SinkId,
    /// Submitter the job originates from.
    pub submitter: SubmitterId,
    /// Initial priority for the job's chunks.
    pub priority: Priority,
    /// Barrier match key for sinks requiring strict job ordering.
    ///
    /// When set, every chunk of the job chains on its predecessor through
    /// this key, and the job's termination chunk waits for all of them.
    pub barrier: Option<String>,
}

/// One partitioned chunk, as handed over by the chunkifier.
#[derive(Debug, Clone)]
pub struct ChunkDescriptor {
    /// The owning job.
    pub job_id: JobId,
    /// The chunk ordinal.
    pub chunk_id: ChunkId,
    /// Record tokens for sequence analysis; absent when the partitioner
    /// extracted none.
    pub tokens: Option<Vec<String>>,
}

impl ChunkDescriptor {
    /// Returns the chunk's tracking key.
    #[must_use]
    pub const fn key(&self) -> TrackingKey {
        TrackingKey::new(self.job_id, self.chunk_id)
    }
}

/// Counts of chunks submitted by one poll pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Chunks pushed onto the processing queue.
    pub processing: usize,
    /// Chunks pushed onto the delivery queue.
    pub delivery: usize,
}

/// Counts from one self-healing sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Blocked chunks released by the recheck.
    pub released: usize,
    /// Stale chunks resent within the retry budget.
    pub resent: usize,
}

/// Drives chunks through the scheduling state machine.
///
/// Sits between the tracking service and the pipeline's queues: the
/// chunkifier, worker-completion listeners and the periodic poll/sweep
/// timers all enter through here.
pub struct ChunkScheduler {
    service: Arc<DependencyTrackingService>,
    dispatcher: Arc<dyn ChunkDispatcher>,
    keygen: Arc<dyn KeyGenerator>,
    config: SchedulerConfig,
    metrics: TrackMetrics,
}

impl std::fmt::Debug for ChunkScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChunkScheduler {
    /// Creates a scheduler over the given service, dispatcher and key
    /// generator.
    #[must_use]
    pub fn new(
        service: Arc<DependencyTrackingService>,
        dispatcher: Arc<dyn ChunkDispatcher>,
        keygen: Arc<dyn KeyGenerator>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            service,
            dispatcher,
            keygen,
            config,
            metrics: TrackMetrics::new(),
        }
    }

    /// Returns the underlying tracking service.
    #[must_use]
    pub fn service(&self) -> &Arc<DependencyTrackingService> {
        &self.service
    }

    // --- Scheduling entry points ---

    /// Registers a chunk for sequence analysis and schedules it.
    ///
    /// Computes match keys from the chunk's record tokens, builds the wait
    /// set, and direct-submits to processing when the sink allows it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    #[tracing::instrument(skip_all, fields(key = %chunk.key(), sink = %job.sink_id))]
    pub async fn schedule_chunk(
        &self,
        chunk: &ChunkDescriptor,
        job: &JobDescriptor,
    ) -> Result<TrackingKey> {
        let tokens = chunk.tokens.as_deref().unwrap_or(&[]);
        let entry = DependencyTracking::new(chunk.key(), job.sink_id, job.submitter)
            .with_match_keys(self.keygen.keys(tokens))
            .with_priority(job.priority.value());

        let key = self
            .service
            .add_and_build_dependencies(entry, job.barrier.as_deref())
            .await?;

        if self
            .service
            .submit_mode(job.sink_id, ChunkSchedulingStatus::QueuedForProcessing)?
            == SubmitMode::Direct
        {
            self.try_submit_processing(key).await?;
        }
        Ok(key)
    }

    /// Schedules the job termination barrier chunk.
    ///
    /// The termination chunk carries the job's barrier key, is created at
    /// high priority, and waits for every live chunk of the job (and every
    /// chunk sharing the barrier key) before it may proceed — the job
    /// cannot complete until all of its chunks have.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn schedule_termination_chunk(
        &self,
        job: &JobDescriptor,
        chunk_id: ChunkId,
    ) -> Result<TrackingKey> {
        let barrier_keys: BTreeSet<String> = job.barrier.iter().cloned().collect();
        let candidates = self
            .service
            .find_job_barrier(job.sink_id, job.job_id, &barrier_keys)
            .await?;

        let entry = DependencyTracking::new(
            TrackingKey::new(job.job_id, chunk_id),
            job.sink_id,
            job.submitter,
        )
        .with_match_keys(barrier_keys)
        .with_priority(Priority::High.value());

        let key = self.service.add(entry).await?;
        self.service.add_to_chunks_to_wait_for(key, candidates).await?;
        info!(%key, "scheduled job termination chunk");
        Ok(key)
    }

    // --- Worker completion handlers ---

    /// Marks a chunk as picked up by a processor worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn processing_started(&self, key: TrackingKey) -> Result<()> {
        self.service
            .set_validated_status(key, ChunkSchedulingStatus::Processing)
            .await?;
        Ok(())
    }

    /// Registers a chunk as processed.
    ///
    /// Chunks not in `PROCESSING` are ignored; the completion message may
    /// be a duplicate or may have raced a resend.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn processing_done(&self, key: TrackingKey) -> Result<()> {
        let Some(entry) = self.service.get(key).await? else {
            info!(%key, "processing done for unknown chunk, assuming already completed");
            return Ok(());
        };
        if !self
            .service
            .set_validated_status(key, ChunkSchedulingStatus::QueuedForDelivery)
            .await?
        {
            return Ok(());
        }
        if self
            .service
            .submit_mode(entry.sink_id, ChunkSchedulingStatus::Delivering)?
            == SubmitMode::Direct
        {
            self.try_submit_delivery(key).await?;
        }
        Ok(())
    }

    /// Sends a failed chunk back through its resend edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn processing_failed(&self, key: TrackingKey) -> Result<()> {
        self.resend(key).await
    }

    /// Registers a chunk as delivered and removes it from tracking.
    ///
    /// Everything waiting on the chunk is released; released chunks are
    /// dispatched immediately instead of waiting for the next poll cycle.
    /// Returns the released keys. Duplicate completions and chunks not in
    /// `DELIVERING` are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    #[tracing::instrument(skip(self), fields(%key))]
    pub async fn delivery_done(&self, key: TrackingKey) -> Result<BTreeSet<TrackingKey>> {
        let Some(entry) = self.service.get(key).await? else {
            info!(%key, "delivery done for unknown chunk, assuming already completed");
            return Ok(BTreeSet::new());
        };
        if entry.status != ChunkSchedulingStatus::Delivering {
            info!(%key, status = %entry.status, "ignoring delivery completion in unexpected status");
            return Ok(BTreeSet::new());
        }

        self.service.remove(key).await?;
        let released = self.service.remove_from_waiting_on(key).await?;
        for released_key in &released {
            self.dispatch_queued(*released_key).await?;
        }
        Ok(released)
    }

    /// Sends a failed delivery back through its resend edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn delivery_failed(&self, key: TrackingKey) -> Result<()> {
        self.resend(key).await
    }

    // --- Bulk submission and self-healing ---

    /// Bulk admission pass for one sink.
    ///
    /// Drains `READY_FOR_PROCESSING` into the processing queue and
    /// `QUEUED_FOR_DELIVERY` into delivery, each bounded by the remaining
    /// per-sink capacity, then flips phases back to direct submit once
    /// their queues are below the transition mark.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn poll_sink(&self, sink_id: SinkId) -> Result<PollOutcome> {
        let mut outcome = PollOutcome::default();

        let space = self
            .service
            .capacity(sink_id, ChunkSchedulingStatus::QueuedForProcessing)?;
        if space > 0 {
            let ready = self
                .service
                .find_entries(
                    ChunkSchedulingStatus::ReadyForProcessing,
                    Some(sink_id),
                    Some(space),
                )
                .await?;
            for entry in ready {
                if self.try_submit_processing(entry.key).await? {
                    outcome.processing += 1;
                }
            }
        }

        let space = self
            .service
            .capacity(sink_id, ChunkSchedulingStatus::Delivering)?;
        if space > 0 {
            let ready = self
                .service
                .find_entries(
                    ChunkSchedulingStatus::QueuedForDelivery,
                    Some(sink_id),
                    Some(space),
                )
                .await?;
            for entry in ready {
                if self.try_submit_delivery(entry.key).await? {
                    outcome.delivery += 1;
                }
            }
        }

        self.restore_direct_modes(sink_id)?;
        Ok(outcome)
    }

    /// Self-healing sweep.
    ///
    /// Rechecks blocked chunks against vanished blockers, dispatches what
    /// that releases, and resends stale entries within the retry budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        let released = self.service.recheck_blocks().await?;
        report.released = released.len();
        for key in released {
            self.dispatch_queued(key).await?;
        }

        for (status, timeout) in [
            (
                ChunkSchedulingStatus::QueuedForProcessing,
                self.config.stale_processing,
            ),
            (ChunkSchedulingStatus::Processing, self.config.stale_processing),
            (ChunkSchedulingStatus::Delivering, self.config.stale_delivery),
        ] {
            let stale = self.service.stale(status, timeout).await?;
            for entry in stale {
                if entry.retries >= self.config.max_retries || !entry.waiting_on.is_empty() {
                    continue;
                }
                self.resend(entry.key).await?;
                report.resent += 1;
            }
        }
        if report.resent > 0 {
            info!(count = report.resent, "resent stale chunks");
        }
        Ok(report)
    }

    /// Aborts a job, dropping every tracked chunk.
    ///
    /// Cross-job references to the dropped chunks converge through
    /// [`Self::sweep`]. Returns the number of chunks removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn abort_job(&self, job_id: JobId) -> Result<usize> {
        let removed = self.service.remove_job(job_id).await?;
        info!(%job_id, chunks = removed, "job aborted");
        Ok(removed)
    }

    // --- Internals ---

    /// Admits one chunk to its sink's processing queue, if capacity allows.
    async fn try_submit_processing(&self, key: TrackingKey) -> Result<bool> {
        let Some(entry) = self.service.get(key).await? else {
            return Ok(false);
        };
        if entry.status != ChunkSchedulingStatus::ReadyForProcessing {
            return Ok(false);
        }
        if self
            .service
            .capacity(entry.sink_id, ChunkSchedulingStatus::QueuedForProcessing)?
            == 0
        {
            self.service.set_submit_mode(
                entry.sink_id,
                ChunkSchedulingStatus::QueuedForProcessing,
                SubmitMode::Bulk,
            )?;
            return Ok(false);
        }
        // recheck under the atomic transition: bulk and direct paths race here
        if !self
            .service
            .set_validated_status(key, ChunkSchedulingStatus::QueuedForProcessing)
            .await?
        {
            return Ok(false);
        }
        self.dispatcher
            .dispatch_processing(ChunkEnvelope::from_entry(&entry))
            .await?;
        Ok(true)
    }

    /// Admits one chunk to its sink's delivery queue, if capacity allows.
    async fn try_submit_delivery(&self, key: TrackingKey) -> Result<bool> {
        let Some(entry) = self.service.get(key).await? else {
            return Ok(false);
        };
        if entry.status != ChunkSchedulingStatus::QueuedForDelivery {
            return Ok(false);
        }
        if self
            .service
            .capacity(entry.sink_id, ChunkSchedulingStatus::Delivering)?
            == 0
        {
            self.service.set_submit_mode(
                entry.sink_id,
                ChunkSchedulingStatus::Delivering,
                SubmitMode::Bulk,
            )?;
            return Ok(false);
        }
        if !self
            .service
            .set_validated_status(key, ChunkSchedulingStatus::Delivering)
            .await?
        {
            return Ok(false);
        }
        self.dispatcher
            .dispatch_delivery(ChunkEnvelope::from_entry(&entry))
            .await?;
        Ok(true)
    }

    /// Dispatches a chunk that is already on the processing queue.
    ///
    /// Used for chunks released from their wait set: the unblock
    /// transition put them in `QUEUED_FOR_PROCESSING` directly, so only
    /// the envelope is missing.
    async fn dispatch_queued(&self, key: TrackingKey) -> Result<()> {
        let Some(entry) = self.service.get(key).await? else {
            return Ok(());
        };
        if entry.status == ChunkSchedulingStatus::QueuedForProcessing {
            self.dispatcher
                .dispatch_processing(ChunkEnvelope::from_entry(&entry))
                .await?;
        }
        Ok(())
    }

    /// Follows a chunk's resend edge under its lease.
    async fn resend(&self, key: TrackingKey) -> Result<()> {
        self.service
            .modify(
                key,
                Box::new(|entry: &mut DependencyTracking| {
                    entry.resend();
                }),
            )
            .await?;
        self.metrics.record_resend();
        Ok(())
    }

    /// Flips phases back to direct submit once their queues drain.
    fn restore_direct_modes(&self, sink_id: SinkId) -> Result<()> {
        for status in [
            ChunkSchedulingStatus::QueuedForProcessing,
            ChunkSchedulingStatus::Delivering,
        ] {
            if self.service.submit_mode(sink_id, status)? == SubmitMode::Bulk
                && self.service.count(sink_id, status)? <= self.config.transition_mark
            {
                self.service
                    .set_submit_mode(sink_id, status, SubmitMode::Direct)?;
            }
        }
        Ok(())
    }
}
