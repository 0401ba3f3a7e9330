//! Engine module: CLI surface and the collaborators it plugs into the pipeline

pub mod arg_parser;
pub mod cli;
pub mod collaborators;
pub mod progress;

// Re-export commonly used functions
pub use arg_parser::{BatchArgs, Cli, Commands, DumpArgs, PipelineArgs};
pub use cli::handle_run;
pub use collaborators::{
    JsonLinesSink, JsonlBatchWriter, ReceivedMessage, key_source, message_source, open_input,
    open_sinks, worker_output_path,
};
