//! CLI command handler: build the config, wire collaborators, run the supervisor.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::time::Duration;

use crate::engine::arg_parser::{BatchArgs, Cli, Commands, DumpArgs, PipelineArgs};
use crate::engine::collaborators::{
    JsonlBatchWriter, key_source, message_source, open_input, open_sinks,
};
use crate::engine::progress::{ProgressBar, create_counter, finish_bar, progress_hook};
use crate::pipeline::{Supervisor, install_interrupt_handler};
use crate::utils::{PROGRESS_DESC, apply_file_to_config, load_batchflow_toml, setup_logging};
use crate::{PipelineConfig, PipelineFailure, PipelineSummary, StopReason};

/// Defaults < config file < CLI flags.
fn setup_config(cli: &Cli, args: &PipelineArgs) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::default();
    let path = cli.config_path();
    if let Some(file) = load_batchflow_toml(&path)? {
        debug!("loaded {}", path.display());
        apply_file_to_config(&file, &mut config);
    }
    if let Some(v) = args.workers {
        config.workers = v;
    }
    if let Some(v) = args.queue_capacity {
        config.queue_capacity = v;
    }
    if let Some(v) = args.batch_size {
        config.batch_size = v;
    }
    if let Some(v) = args.log_step {
        config.log_step = v;
    }
    if let Some(secs) = args.tick_secs {
        config.tick_interval = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(secs) = args.deadline_secs {
        config.deadline = (secs > 0).then(|| Duration::from_secs(secs));
    }
    Ok(config)
}

/// Build the supervisor, install the interrupt handler and optional progress counter.
fn setup_supervisor(
    config: PipelineConfig,
    progress: bool,
) -> Result<(Supervisor, Option<ProgressBar>)> {
    let supervisor = Supervisor::new(config)?;
    install_interrupt_handler(supervisor.cancel_token())?;
    let bar = progress.then(|| create_counter(PROGRESS_DESC));
    let supervisor = match &bar {
        Some(b) => supervisor.with_progress(progress_hook(b)),
        None => supervisor,
    };
    Ok((supervisor, bar))
}

fn finish(
    outcome: Result<PipelineSummary, PipelineFailure>,
    bar: Option<ProgressBar>,
    what: &str,
) -> Result<()> {
    if let Some(b) = &bar {
        finish_bar(b);
    }
    let summary = outcome.with_context(|| format!("{what} failed"))?;
    match summary.stop {
        StopReason::Interrupted => warn!(
            "interrupted: {} of {} items {} before shutdown",
            summary.committed, summary.produced, what
        ),
        StopReason::DeadlineReached => warn!(
            "deadline reached: {} of {} items {}",
            summary.committed, summary.produced, what
        ),
        _ => info!(
            "{} items {} in {} batches",
            summary.committed, what, summary.batches
        ),
    }
    Ok(())
}

fn handle_batch(cli: &Cli, args: &BatchArgs) -> Result<()> {
    let config = setup_config(cli, &args.pipeline)?;
    let source = key_source(
        open_input(args.pipeline.input.as_deref())?,
        args.display_key,
    );
    let operation = JsonlBatchWriter::create(&args.output)?
        .with_latency(Duration::from_millis(args.latency_ms))
        .fail_after_batches(args.fail_after_batches);
    info!("batch log: {}", args.output.display());

    let (supervisor, bar) = setup_supervisor(config, args.pipeline.progress)?;
    finish(supervisor.run_batches(source, operation), bar, "flushed")
}

fn handle_dump(cli: &Cli, args: &DumpArgs) -> Result<()> {
    let mut config = setup_config(cli, &args.pipeline)?;
    if let Some(v) = args.out_discard {
        config.out_discard = v;
    }
    let source = message_source(open_input(args.pipeline.input.as_deref())?);
    let sinks = open_sinks(args.out_prefix.as_deref(), config.workers, args.raw)?;

    let (supervisor, bar) = setup_supervisor(config, args.pipeline.progress)?;
    finish(supervisor.run_dump(source, sinks), bar, "received")
}

/// Run the selected command.
pub fn handle_run(cli: &Cli) -> Result<()> {
    setup_logging(&cli.log_level, cli.verbose);
    info!(
        "ver={}, args={:?}",
        env!("CARGO_PKG_VERSION"),
        std::env::args().collect::<Vec<_>>()
    );
    match &cli.command {
        Commands::Batch(args) => handle_batch(cli, args),
        Commands::Dump(args) => handle_dump(cli, args),
    }
}
