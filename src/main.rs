//! Batchflow CLI: run the batch or dump pipeline over line-oriented input.

use anyhow::Result;
use batchflow::engine::{Cli, handle_run};
use clap::Parser;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::info!("done, dur={:?}", start_time.elapsed());
    Ok(())
}
