//! Pipeline error taxonomy.

use thiserror::Error;

use crate::types::{PipelineSummary, StopReason};

/// Fatal errors from pipeline tasks. The first one recorded cancels the run; later ones are discarded.
///
/// Cancellation itself is not an error: components see it as a channel outcome and the run
/// reports it through [`StopReason`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("item source failed after {produced} items: {source}")]
    Source {
        produced: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("worker {worker}: remote batch operation failed for {batch_len} items: {source}")]
    RemoteOperation {
        worker: usize,
        batch_len: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("sink worker {worker}: {source}")]
    Sink {
        worker: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("task {task} panicked: {message}")]
    Panicked { task: String, message: String },

    #[error("failed to spawn {task}: {source}")]
    Spawn {
        task: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),
}

/// First fatal error of a run plus what had been committed before it.
#[derive(Debug, Error)]
#[error("{error} ({committed} items committed before failure)", committed = .summary.committed)]
pub struct PipelineFailure {
    #[source]
    pub error: PipelineError,
    pub summary: PipelineSummary,
}

impl PipelineFailure {
    /// Failure raised before any thread was spawned (e.g. invalid config).
    pub fn before_start(error: PipelineError) -> Self {
        Self {
            error,
            summary: PipelineSummary {
                produced: 0,
                dequeued: 0,
                committed: 0,
                batches: 0,
                stop: StopReason::Failed,
            },
        }
    }
}
