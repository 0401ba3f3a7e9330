//! Supervisor: spawns the source, consumers and reporter; cancels on the first error, interrupt or
//! deadline; drains in two phases (producers and consumers, then the reporter) before returning.

use crossbeam_channel::{Receiver, Sender, after, bounded, select};
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{PipelineError, PipelineFailure};
use crate::{
    CompletionReport, ItemSource, PipelineConfig, PipelineSummary, RemoteBatchOperation, Sink,
    StopReason, WorkerStats,
};

use super::cancel::{CancelReason, CancelToken};
use super::context::{PipelineContext, create_pipeline_channels};
use super::group::TaskGroup;
use super::reporter::{ProgressHook, ReporterParams, ReporterTotals, run_reporter};
use super::sink::spawn_sink_workers;
use super::source::run_source_loop;
use super::worker::spawn_batch_workers;

/// Owns the per-run context. One supervisor drives one run.
pub struct Supervisor {
    config: PipelineConfig,
    ctx: PipelineContext,
    on_progress: Option<ProgressHook>,
}

impl Supervisor {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            ctx: PipelineContext::new(CancelToken::new()),
            on_progress: None,
        })
    }

    /// Token for external cancellation (signal handler, caller-side timeout).
    pub fn cancel_token(&self) -> CancelToken {
        self.ctx.cancel.clone()
    }

    pub fn with_progress(mut self, hook: ProgressHook) -> Self {
        self.on_progress = Some(hook);
        self
    }

    /// Batching variant: `config.workers` workers flush batches to `operation`.
    pub fn run_batches<T, S, Op>(
        self,
        source: S,
        operation: Op,
    ) -> Result<PipelineSummary, PipelineFailure>
    where
        T: Send + 'static,
        S: ItemSource<T> + Send + 'static,
        Op: RemoteBatchOperation<T> + 'static,
    {
        let operation = Arc::new(operation);
        let workers = self.config.workers;
        let batch_size = self.config.batch_size;
        self.drive(source, move |group, item_rx, report_tx, ctx| {
            spawn_batch_workers(
                group, item_rx, report_tx, operation, workers, batch_size, ctx,
            )
        })
    }

    /// Receive/dump variant: one sink worker per sink; `config.out_discard` skips writes.
    pub fn run_dump<T, S, K>(
        self,
        source: S,
        sinks: Vec<K>,
    ) -> Result<PipelineSummary, PipelineFailure>
    where
        T: Send + 'static,
        S: ItemSource<T> + Send + 'static,
        K: Sink<T> + 'static,
    {
        if sinks.is_empty() {
            return Err(PipelineFailure::before_start(PipelineError::InvalidConfig(
                "dump needs at least one sink".into(),
            )));
        }
        let commit_every = self.config.batch_size;
        let discard = self.config.out_discard;
        if discard {
            info!("output discarded; counting only");
        }
        self.drive(source, move |group, item_rx, report_tx, ctx| {
            spawn_sink_workers(
                group,
                item_rx,
                report_tx,
                sinks,
                commit_every,
                discard,
                ctx,
            )
        })
    }

    fn drive<T, S, C>(self, source: S, spawn_consumers: C) -> Result<PipelineSummary, PipelineFailure>
    where
        T: Send + 'static,
        S: ItemSource<T> + Send + 'static,
        C: FnOnce(
            &mut TaskGroup<WorkerStats>,
            Receiver<T>,
            &Sender<CompletionReport>,
            &PipelineContext,
        ) -> Result<(), PipelineError>,
    {
        let Supervisor {
            config,
            ctx,
            on_progress,
        } = self;
        let channels = create_pipeline_channels::<T>(&config);
        let (finished_tx, finished_rx) = bounded::<()>(0);
        let deadline_watch = match config.deadline {
            Some(d) => match spawn_deadline_watch(d, ctx.cancel.clone(), finished_rx) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    ctx.errors.record(err);
                    None
                }
            },
            None => None,
        };

        let mut reporter_group: TaskGroup<ReporterTotals> =
            TaskGroup::new("reporter", ctx.errors.clone());
        let mut source_group: TaskGroup<usize> = TaskGroup::new("source", ctx.errors.clone());
        let mut worker_group: TaskGroup<WorkerStats> =
            TaskGroup::new("worker", ctx.errors.clone());

        let reporter_params = ReporterParams {
            report_rx: channels.report_rx,
            log_step: config.log_step,
            tick_interval: config.tick_interval,
            cancel: ctx.cancel.clone(),
            on_progress,
        };
        if let Err(err) = reporter_group.spawn("reporter", move || run_reporter(reporter_params)) {
            ctx.errors.record(err);
        }

        // Consumers first so the source never fills the queue with nobody to drain it.
        if let Err(err) = spawn_consumers(
            &mut worker_group,
            channels.item_rx,
            &channels.report_tx,
            &ctx,
        ) {
            ctx.errors.record(err);
        }
        let item_tx = channels.item_tx;
        let source_ctx = ctx.clone();
        if let Err(err) = source_group.spawn("source", move || {
            run_source_loop(source, item_tx, &source_ctx)
        }) {
            ctx.errors.record(err);
        }
        debug!(
            "supervisor: {} consumers, queue capacity {}, batch size {}",
            worker_group.len(),
            config.queue_capacity,
            config.batch_size
        );

        // Phase 1: producers and consumers. Nothing else holds item senders or receivers now.
        let produced: Option<usize> = source_group.wait().into_iter().next();
        let worker_stats = worker_group.wait();

        // Phase 2: close the report channel; the reporter exits once it has drained it.
        drop(channels.report_tx);
        let totals = reporter_group.wait().into_iter().next();

        drop(finished_tx);
        if let Some(handle) = deadline_watch
            && handle.join().is_err()
        {
            warn!("deadline watcher panicked");
        }

        // Shared counter, not the worker stats: a worker that failed returned no stats.
        let dequeued = ctx.dequeued.get();
        let worker_committed: usize = worker_stats.iter().map(|s| s.committed).sum();
        let worker_batches: usize = worker_stats.iter().map(|s| s.batches).sum();
        let error = ctx.errors.take();
        let produced = match (&error, produced) {
            (_, Some(n)) => n,
            (Some(PipelineError::Source { produced, .. }), None) => *produced,
            (_, None) => dequeued,
        };
        let stop = match (&error, ctx.cancel.reason()) {
            (Some(_), _) => StopReason::Failed,
            (None, Some(CancelReason::Interrupt)) => StopReason::Interrupted,
            (None, Some(CancelReason::Deadline)) => StopReason::DeadlineReached,
            (None, Some(CancelReason::Error)) => StopReason::Failed,
            (None, None) => StopReason::Completed,
        };
        let summary = PipelineSummary {
            produced,
            dequeued,
            committed: totals.map_or(worker_committed, |t| t.total),
            batches: totals.map_or(worker_batches, |t| t.reports),
            stop,
        };
        debug!("supervisor: {:?}", summary);

        match error {
            Some(error) => Err(PipelineFailure { error, summary }),
            None => Ok(summary),
        }
    }
}

/// Cancel with [`CancelReason::Deadline`] after `deadline`, unless the run finishes or is cancelled first.
fn spawn_deadline_watch(
    deadline: Duration,
    cancel: CancelToken,
    finished: Receiver<()>,
) -> Result<JoinHandle<()>, PipelineError> {
    let task = "deadline-watch";
    thread::Builder::new()
        .name(task.into())
        .spawn(move || {
            select! {
                recv(after(deadline)) -> _ => {
                    if cancel.cancel(CancelReason::Deadline) {
                        info!("deadline of {:?} reached; draining in-flight batches", deadline);
                    }
                }
                recv(cancel.done()) -> _ => {}
                recv(finished) -> _ => {}
            }
        })
        .map_err(|source| PipelineError::Spawn {
            task: task.into(),
            source,
        })
}
