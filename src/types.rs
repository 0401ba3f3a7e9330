//! Public and internal types for the batchflow API and pipeline.

use anyhow::Result;
use std::time::Duration;

use crate::error::PipelineError;
use crate::utils::config::PipelineDefaults;

/// Lazy, finite producer of items. Called from a single source thread; not restartable mid-run.
pub trait ItemSource<T> {
    /// Next item, or `Ok(None)` once the enumeration is exhausted.
    fn next(&mut self) -> Result<Option<T>>;
}

/// The side-effecting remote call applied to a whole batch (delete-multi, publish, persist).
///
/// Atomic from the pipeline's point of view: `Ok` means every item in `batch` is committed and
/// reported; `Err` means none is. Shared by all workers, hence `Send + Sync`.
pub trait RemoteBatchOperation<T>: Send + Sync {
    fn apply(&self, batch: &[T]) -> Result<()>;
}

impl<T, F> RemoteBatchOperation<T> for F
where
    F: Fn(&[T]) -> Result<()> + Send + Sync,
{
    fn apply(&self, batch: &[T]) -> Result<()> {
        self(batch)
    }
}

/// Per-record output for the receive/dump variant. Each sink is owned by exactly one sink worker.
pub trait Sink<T>: Send {
    fn write(&mut self, record: &T) -> Result<()>;

    /// Make written records durable. Called every `batch_size` records and once on exit.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T, S> Sink<T> for Box<S>
where
    S: Sink<T> + ?Sized,
{
    fn write(&mut self, record: &T) -> Result<()> {
        (**self).write(record)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Count of items committed by one successful flush. Emitted once per flush, consumed once by the reporter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompletionReport {
    pub worker: usize,
    pub items: usize,
}

/// What one worker did before it returned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Items received from the queue.
    pub dequeued: usize,
    /// Items in batches that were flushed successfully.
    pub committed: usize,
    /// Successful flushes.
    pub batches: usize,
}

/// Why a run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Source exhausted and every batch flushed.
    Completed,
    /// External interrupt (Ctrl+C); in-flight batches were drained.
    Interrupted,
    /// Configured deadline elapsed; in-flight batches were drained.
    DeadlineReached,
    /// A task failed; see [`PipelineFailure`](crate::PipelineFailure).
    Failed,
}

/// Result of a run. `committed` is the reporter's final total.
///
/// Always `committed <= dequeued <= produced`; on [`StopReason::Completed`] all three are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Items handed to the bounded queue by the source.
    pub produced: usize,
    /// Items taken off the queue by workers.
    pub dequeued: usize,
    /// Items reported as committed.
    pub committed: usize,
    /// Completion reports received (one per successful flush).
    pub batches: usize,
    pub stop: StopReason,
}

/// Pipeline tuning. Built from defaults, then `.batchflow.toml`, then CLI flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Capacity of the bounded item queue. The source blocks when it is full.
    pub queue_capacity: usize,
    /// Max items per flush.
    pub batch_size: usize,
    /// Worker threads (sink workers in the dump variant are one per sink instead).
    pub workers: usize,
    /// Log the running total every `log_step` committed items; 0 disables.
    pub log_step: usize,
    /// Log the running total on this cadence even when nothing arrives.
    pub tick_interval: Option<Duration>,
    /// Stop accepting new work after this long, then drain.
    pub deadline: Option<Duration>,
    /// Dump variant only: count items without writing them to the sinks.
    pub out_discard: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: PipelineDefaults::QUEUE_CAPACITY,
            batch_size: PipelineDefaults::BATCH_SIZE,
            workers: PipelineDefaults::WORKERS,
            log_step: PipelineDefaults::LOG_STEP,
            tick_interval: Some(PipelineDefaults::TICK_INTERVAL),
            deadline: None,
            out_discard: false,
        }
    }
}

impl PipelineConfig {
    /// Reject settings that would deadlock or never flush.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.queue_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "queue_capacity must be at least 1".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch_size must be at least 1".into(),
            ));
        }
        if self.workers == 0 {
            return Err(PipelineError::InvalidConfig(
                "workers must be at least 1".into(),
            ));
        }
        if self.tick_interval.is_some_and(|d| d.is_zero()) {
            return Err(PipelineError::InvalidConfig(
                "tick_interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
