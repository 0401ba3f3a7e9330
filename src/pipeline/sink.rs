//! Sink workers for the receive/dump variant: each owns one [`Sink`] and writes records one at a time.

use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};

use crate::error::PipelineError;
use crate::{CompletionReport, Sink, WorkerStats};

use super::cancel::{CancelToken, Received, recv_or_cancel};
use super::context::{DequeueCounter, PipelineContext};
use super::group::TaskGroup;

/// Everything one sink worker owns.
pub struct SinkWorkerParams<T, K> {
    pub worker_id: usize,
    pub item_rx: Receiver<T>,
    pub report_tx: Sender<CompletionReport>,
    pub sink: K,
    /// Flush the sink and report after this many records.
    pub commit_every: usize,
    /// Count records without writing them.
    pub discard: bool,
    pub cancel: CancelToken,
    pub dequeued: DequeueCounter,
}

struct Pending {
    records: usize,
}

/// Flush the sink and report the records written since the previous commit.
fn commit<T, K: Sink<T>>(
    worker_id: usize,
    sink: &mut K,
    pending: &mut Pending,
    report_tx: &Sender<CompletionReport>,
    stats: &mut WorkerStats,
) -> Result<(), PipelineError> {
    if pending.records == 0 {
        return Ok(());
    }
    sink.flush().map_err(|source| PipelineError::Sink {
        worker: worker_id,
        source,
    })?;
    let n = pending.records;
    pending.records = 0;
    stats.committed += n;
    stats.batches += 1;
    if report_tx
        .send(CompletionReport {
            worker: worker_id,
            items: n,
        })
        .is_err()
    {
        warn!(
            "sink worker {}: reporter gone, {} records unreported",
            worker_id, n
        );
    }
    Ok(())
}

/// Single sink worker loop. Records already written are flushed on the way out, including on
/// cancellation; records still in the queue are left there.
pub fn run_sink_worker<T, K>(params: SinkWorkerParams<T, K>) -> Result<WorkerStats, PipelineError>
where
    K: Sink<T>,
{
    let SinkWorkerParams {
        worker_id,
        item_rx,
        report_tx,
        mut sink,
        commit_every,
        discard,
        cancel,
        dequeued,
    } = params;
    let mut stats = WorkerStats::default();
    let mut pending = Pending { records: 0 };

    loop {
        match recv_or_cancel(&item_rx, &cancel) {
            Received::Item(record) => {
                stats.dequeued += 1;
                dequeued.bump();
                if !discard {
                    sink.write(&record)
                        .map_err(|source| PipelineError::Sink {
                            worker: worker_id,
                            source,
                        })?;
                }
                pending.records += 1;
                if pending.records >= commit_every {
                    commit(worker_id, &mut sink, &mut pending, &report_tx, &mut stats)?;
                }
            }
            Received::Closed => {
                commit(worker_id, &mut sink, &mut pending, &report_tx, &mut stats)?;
                debug!(
                    "sink worker {}: queue closed, {} records",
                    worker_id, stats.committed
                );
                return Ok(stats);
            }
            Received::Cancelled | Received::TimedOut => {
                commit(worker_id, &mut sink, &mut pending, &report_tx, &mut stats)?;
                debug!(
                    "sink worker {}: cancelled after {} records",
                    worker_id, stats.committed
                );
                return Ok(stats);
            }
        }
    }
}

/// Spawn one sink worker per sink into `group`.
pub fn spawn_sink_workers<T, K>(
    group: &mut TaskGroup<WorkerStats>,
    item_rx: Receiver<T>,
    report_tx: &Sender<CompletionReport>,
    sinks: Vec<K>,
    commit_every: usize,
    discard: bool,
    ctx: &PipelineContext,
) -> Result<(), PipelineError>
where
    T: Send + 'static,
    K: Sink<T> + 'static,
{
    for (worker_id, sink) in sinks.into_iter().enumerate() {
        let params = SinkWorkerParams {
            worker_id,
            item_rx: item_rx.clone(),
            report_tx: report_tx.clone(),
            sink,
            commit_every,
            discard,
            cancel: ctx.cancel.clone(),
            dequeued: ctx.dequeued.clone(),
        };
        group.spawn(format!("sink-worker-{worker_id}"), move || {
            run_sink_worker(params)
        })?;
    }
    Ok(())
}
