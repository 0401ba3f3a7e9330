//! Batch workers: take items off the bounded queue, accumulate a batch, flush it to the remote operation.
//!
//! Workers take turns assembling: a worker holds the single assembly turn while it receives items
//! for one batch, hands the turn on, then flushes. Flushes run in parallel; assembly does not, so
//! every batch is full except the last one of the run.

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;

use crate::error::PipelineError;
use crate::{CompletionReport, RemoteBatchOperation, WorkerStats};

use super::cancel::{CancelToken, Received, recv_or_cancel};
use super::context::{DequeueCounter, PipelineContext};
use super::group::TaskGroup;

/// Everything one worker owns. Moved into the worker thread by value.
pub struct WorkerParams<T, Op: ?Sized> {
    pub worker_id: usize,
    pub item_rx: Receiver<T>,
    pub report_tx: Sender<CompletionReport>,
    pub operation: Arc<Op>,
    pub batch_size: usize,
    pub turn: AssemblyTurn,
    pub cancel: CancelToken,
    pub dequeued: DequeueCounter,
}

/// The right to receive items for a batch. Exactly one turn circulates between the workers of a run.
#[derive(Clone)]
pub struct AssemblyTurn {
    give: Sender<()>,
    take: Receiver<()>,
}

impl AssemblyTurn {
    pub fn new() -> Self {
        let (give, take) = bounded::<()>(1);
        // Capacity 1 and one token: handing the turn back never blocks.
        let _ = give.send(());
        Self { give, take }
    }

    fn acquire(&self, cancel: &CancelToken) -> bool {
        matches!(recv_or_cancel(&self.take, cancel), Received::Item(()))
    }

    fn release(&self) {
        let _ = self.give.send(());
    }
}

impl Default for AssemblyTurn {
    fn default() -> Self {
        Self::new()
    }
}

enum Assembled {
    Full,
    Closed,
    Cancelled,
}

/// Receive until `batch` holds `batch_size` items, the queue closes, or the run is cancelled.
fn fill_batch<T>(
    item_rx: &Receiver<T>,
    batch: &mut Vec<T>,
    batch_size: usize,
    cancel: &CancelToken,
    dequeued: &DequeueCounter,
    stats: &mut WorkerStats,
) -> Assembled {
    while batch.len() < batch_size {
        match recv_or_cancel(item_rx, cancel) {
            Received::Item(item) => {
                stats.dequeued += 1;
                dequeued.bump();
                batch.push(item);
            }
            Received::Closed => return Assembled::Closed,
            Received::Cancelled | Received::TimedOut => return Assembled::Cancelled,
        }
    }
    Assembled::Full
}

/// Apply the remote operation to the whole batch, then report it. Nothing is reported on failure.
fn flush_batch<T, Op>(
    worker_id: usize,
    batch: &mut Vec<T>,
    operation: &Op,
    report_tx: &Sender<CompletionReport>,
    stats: &mut WorkerStats,
) -> Result<(), PipelineError>
where
    Op: RemoteBatchOperation<T> + ?Sized,
{
    let n = batch.len();
    let started = Instant::now();
    debug!("worker {}: flushing {} items", worker_id, n);
    operation
        .apply(batch)
        .map_err(|source| PipelineError::RemoteOperation {
            worker: worker_id,
            batch_len: n,
            source,
        })?;
    info!(
        "worker {}: flushed {} items in {:?}",
        worker_id,
        n,
        started.elapsed()
    );
    batch.clear();
    stats.committed += n;
    stats.batches += 1;
    if report_tx
        .send(CompletionReport {
            worker: worker_id,
            items: n,
        })
        .is_err()
    {
        warn!("worker {}: reporter gone, {} items unreported", worker_id, n);
    }
    Ok(())
}

/// Single batch worker loop. Returns its stats on queue close or cancellation; returns the
/// remote operation's error (fatal to the run) if a flush fails.
pub fn run_batch_worker<T, Op>(params: WorkerParams<T, Op>) -> Result<WorkerStats, PipelineError>
where
    Op: RemoteBatchOperation<T> + ?Sized,
{
    let WorkerParams {
        worker_id,
        item_rx,
        report_tx,
        operation,
        batch_size,
        turn,
        cancel,
        dequeued,
    } = params;
    let mut batch = Vec::with_capacity(batch_size);
    let mut stats = WorkerStats::default();

    loop {
        if !turn.acquire(&cancel) {
            debug!("worker {}: cancelled while waiting for a turn", worker_id);
            return Ok(stats);
        }
        let assembled = fill_batch(
            &item_rx, &mut batch, batch_size, &cancel, &dequeued, &mut stats,
        );
        turn.release();

        match assembled {
            Assembled::Full => {
                flush_batch(worker_id, &mut batch, &*operation, &report_tx, &mut stats)?;
            }
            Assembled::Closed => {
                if !batch.is_empty() {
                    flush_batch(worker_id, &mut batch, &*operation, &report_tx, &mut stats)?;
                }
                debug!(
                    "worker {}: queue closed, {} items in {} batches",
                    worker_id, stats.committed, stats.batches
                );
                return Ok(stats);
            }
            Assembled::Cancelled => {
                if !batch.is_empty() {
                    debug!(
                        "worker {}: cancelled, dropping {} unflushed items",
                        worker_id,
                        batch.len()
                    );
                }
                return Ok(stats);
            }
        }
    }
}

/// Spawn `workers` batch workers into `group`. Each gets its own clones of the queue receiver,
/// the report sender, the operation handle and the assembly turn.
pub fn spawn_batch_workers<T, Op>(
    group: &mut TaskGroup<WorkerStats>,
    item_rx: Receiver<T>,
    report_tx: &Sender<CompletionReport>,
    operation: Arc<Op>,
    workers: usize,
    batch_size: usize,
    ctx: &PipelineContext,
) -> Result<(), PipelineError>
where
    T: Send + 'static,
    Op: RemoteBatchOperation<T> + ?Sized + 'static,
{
    let turn = AssemblyTurn::new();
    for worker_id in 0..workers {
        let params = WorkerParams {
            worker_id,
            item_rx: item_rx.clone(),
            report_tx: report_tx.clone(),
            operation: Arc::clone(&operation),
            batch_size,
            turn: turn.clone(),
            cancel: ctx.cancel.clone(),
            dequeued: ctx.dequeued.clone(),
        };
        group.spawn(format!("batch-worker-{worker_id}"), move || {
            run_batch_worker(params)
        })?;
    }
    Ok(())
}
