//! Pipeline context and channels: shared state passed explicitly into every stage.

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::CompletionReport;
use crate::PipelineConfig;

use super::cancel::CancelToken;
use super::error_handler::ErrorLatch;

/// Per-run shared state: the cancellation token, the first-error latch that trips it, and the
/// dequeue counter. Built once by the supervisor and cloned into each thread; there is no
/// process-wide state.
#[derive(Clone)]
pub struct PipelineContext {
    pub cancel: CancelToken,
    pub errors: ErrorLatch,
    pub dequeued: DequeueCounter,
}

impl PipelineContext {
    pub fn new(cancel: CancelToken) -> Self {
        let errors = ErrorLatch::new(cancel.clone());
        Self {
            cancel,
            errors,
            dequeued: DequeueCounter::default(),
        }
    }
}

/// Items taken off the queue by all consumers of a run. Bumped per item, so it stays correct
/// when a worker exits with an error or a panic and its own stats are lost.
#[derive(Clone, Debug, Default)]
pub struct DequeueCounter(Arc<AtomicUsize>);

impl DequeueCounter {
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Channels for one run. Source gets `item_tx`; workers get `item_rx` and `report_tx`;
/// the reporter gets `report_rx`.
pub struct PipelineChannels<T> {
    /// Bounded queue: its capacity is the backpressure on the source.
    pub item_tx: Sender<T>,
    pub item_rx: Receiver<T>,
    /// Unbounded so that reporting a committed batch never blocks a worker.
    pub report_tx: Sender<CompletionReport>,
    pub report_rx: Receiver<CompletionReport>,
}

pub fn create_pipeline_channels<T>(config: &PipelineConfig) -> PipelineChannels<T> {
    let (item_tx, item_rx) = bounded::<T>(config.queue_capacity);
    let (report_tx, report_rx) = unbounded::<CompletionReport>();
    PipelineChannels {
        item_tx,
        item_rx,
        report_tx,
        report_rx,
    }
}
