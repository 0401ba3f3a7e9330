//! Batchflow: bounded, cancellation-safe batch pipeline (source → bounded queue → batching workers → reporter)

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use error::{PipelineError, PipelineFailure};
pub use types::*;

use log::debug;

pub use pipeline::{CancelReason, CancelToken, Supervisor};

/// Single entry point for the batching variant: pull every item out of `source`, group items into
/// batches of at most `config.batch_size`, and hand each batch to `operation` from one of
/// `config.workers` threads.
///
/// Returns the run summary on success (including an interrupted or deadline-limited run), or the
/// first fatal error together with the partial summary.
///
/// ```ignore
/// let cfg = PipelineConfig { batch_size: 500, workers: 8, ..Default::default() };
/// let summary = batchflow::run_batches(batchflow::pipeline::infallible(keys), delete_multi, &cfg)?;
/// ```
pub fn run_batches<T, S, Op>(
    source: S,
    operation: Op,
    config: &PipelineConfig,
) -> Result<PipelineSummary, PipelineFailure>
where
    T: Send + 'static,
    S: ItemSource<T> + Send + 'static,
    Op: RemoteBatchOperation<T> + 'static,
{
    log_config(config);
    Supervisor::new(config.clone())
        .map_err(PipelineFailure::before_start)?
        .run_batches(source, operation)
}

/// Entry point for the receive/dump variant: every item is written to one of `sinks`
/// (one sink worker per sink), or only counted when `config.out_discard` is set.
pub fn run_dump<T, S, K>(
    source: S,
    sinks: Vec<K>,
    config: &PipelineConfig,
) -> Result<PipelineSummary, PipelineFailure>
where
    T: Send + 'static,
    S: ItemSource<T> + Send + 'static,
    K: Sink<T> + 'static,
{
    log_config(config);
    Supervisor::new(config.clone())
        .map_err(PipelineFailure::before_start)?
        .run_dump(source, sinks)
}

fn log_config(config: &PipelineConfig) {
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        config
    );
}
