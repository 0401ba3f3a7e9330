//! Application configuration constants.
//! Pipeline defaults and file names in one place.

use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME) ----

/// Package-derived names.
pub struct PackagePaths;

impl PackagePaths {
    pub fn pkg_name() -> &'static str {
        env!("CARGO_PKG_NAME")
    }

    /// Per-directory config file: `.batchflow.toml`.
    pub fn config_filename() -> String {
        format!(".{}.toml", Self::pkg_name())
    }
}

// ---- Pipeline ----

/// Defaults for [`PipelineConfig`](crate::PipelineConfig).
pub struct PipelineDefaults;

impl PipelineDefaults {
    /// Bounded queue capacity: about one batch, so the source runs at most one batch ahead.
    pub const QUEUE_CAPACITY: usize = 500;
    /// Max items per remote call (datastore delete-multi limit).
    pub const BATCH_SIZE: usize = 500;
    pub const WORKERS: usize = 8;
    /// Log the running total every this many committed items.
    pub const LOG_STEP: usize = 1000;
    pub const TICK_INTERVAL: Duration = Duration::from_secs(60);
}

// ---- Progress ----

/// Progress bar description shown by the CLI.
pub const PROGRESS_DESC: &str = "Committed";
