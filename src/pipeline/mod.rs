//! Pipeline components: cancellation, context, source, workers, reporter, supervisor.

pub mod cancel;
pub mod context;
pub mod error_handler;
pub mod group;
pub mod orchestrator;
pub mod reporter;
pub mod sink;
pub mod source;
pub mod worker;

pub use cancel::{
    CancelReason, CancelToken, Received, SendOutcome, install_interrupt_handler, recv_or_cancel,
    recv_or_cancel_until, send_or_cancel,
};
pub use context::{
    DequeueCounter, PipelineChannels, PipelineContext, create_pipeline_channels,
};
pub use error_handler::ErrorLatch;
pub use group::TaskGroup;
pub use orchestrator::Supervisor;
pub use reporter::{ProgressHook, ReporterParams, ReporterTotals, run_reporter};
pub use sink::{SinkWorkerParams, run_sink_worker, spawn_sink_workers};
pub use source::{InfallibleSource, IterSource, Page, PagedSource, infallible, run_source_loop};
pub use worker::{AssemblyTurn, WorkerParams, run_batch_worker, spawn_batch_workers};
