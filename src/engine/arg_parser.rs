use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::utils::config::PackagePaths;

struct DefaultArgs;

impl DefaultArgs {
    pub const LOG_LEVEL: &'static str = "info";
    pub const BATCH_LOG: &'static str = "batches.jsonl";
}

/// Bounded, cancellation-safe batch pipeline.
#[derive(Clone, Parser)]
#[command(name = "batchflow")]
#[command(about = "Move items from a source through a bounded queue to batching workers.")]
pub struct Cli {
    /// Log level for this crate: debug|info|warn|error.
    #[arg(long, global = true, default_value = DefaultArgs::LOG_LEVEL)]
    pub log_level: String,

    /// Verbose output (forces debug logging).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Config file. Default: `.batchflow.toml` in the current directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(PackagePaths::config_filename()))
    }
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Read keys (one per line) and flush them in batches to a JSON-lines batch log.
    Batch(BatchArgs),
    /// Read messages (one per line) and write one record per message.
    Dump(DumpArgs),
}

/// Pipeline tuning shared by every command. Unset flags keep the config-file or default value.
#[derive(Clone, Debug, Default, Args)]
pub struct PipelineArgs {
    /// Number of workers.
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Bounded queue capacity between the source and the workers.
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Max items per batch (per sink flush in `dump`).
    #[arg(long, short = 'b')]
    pub batch_size: Option<usize>,

    /// Log the running total every N committed items (0 disables).
    #[arg(long)]
    pub log_step: Option<usize>,

    /// Log the running total every N seconds (0 disables).
    #[arg(long)]
    pub tick_secs: Option<u64>,

    /// Stop taking new items after N seconds, then drain.
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Show a progress counter.
    #[arg(long)]
    pub progress: bool,

    /// Input file, one item per line. Default: stdin.
    #[arg(long, short = 'i', value_name = "FILE")]
    pub input: Option<PathBuf>,
}

#[derive(Clone, Debug, Args)]
pub struct BatchArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Batch log written by the flush operation (one JSON array per batch).
    #[arg(long, short = 'o', default_value = DefaultArgs::BATCH_LOG)]
    pub output: PathBuf,

    /// Print each key as it is read.
    #[arg(long)]
    pub display_key: bool,

    /// Simulated backend latency per flush, in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,

    /// Fail the flush after N successful batches (exercise failure handling).
    #[arg(long)]
    pub fail_after_batches: Option<usize>,
}

#[derive(Clone, Debug, Args)]
pub struct DumpArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Count messages without serialising them.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub out_discard: Option<bool>,

    /// Write the message body only instead of a JSON record.
    #[arg(long)]
    pub raw: bool,

    /// Write one file per worker: `<prefix>000`, `<prefix>001`, ... Default: a single stdout writer.
    #[arg(long, value_name = "PATH/TO/PREFIX")]
    pub out_prefix: Option<String>,
}
