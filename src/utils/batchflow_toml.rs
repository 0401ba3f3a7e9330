//! Load `.batchflow.toml` (CLI only). The lib does not read files; callers pass a `PipelineConfig`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::PipelineConfig;

#[derive(Debug, Default, Deserialize)]
pub struct BatchflowToml {
    #[serde(default)]
    pub pipeline: PipelineSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSection {
    pub queue_capacity: Option<usize>,
    pub batch_size: Option<usize>,
    pub workers: Option<usize>,
    pub log_step: Option<usize>,
    /// 0 disables the periodic tick log.
    pub tick_secs: Option<u64>,
    pub deadline_secs: Option<u64>,
    pub out_discard: Option<bool>,
}

/// Parse a config file's contents.
pub fn parse_batchflow_toml(s: &str) -> Result<BatchflowToml> {
    toml::from_str(s).context("parse batchflow config")
}

/// Load the config file at `path`. A missing file is `Ok(None)`; an unreadable or invalid one is an error.
pub fn load_batchflow_toml(path: &Path) -> Result<Option<BatchflowToml>> {
    if !path.exists() {
        return Ok(None);
    }
    let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_batchflow_toml(&s)
        .with_context(|| format!("{}", path.display()))
        .map(Some)
}

/// Overwrite config field from file when present.
macro_rules! apply_file_opt {
    ($section:expr, $config:expr, $field:ident) => {
        if let Some(v) = $section.$field {
            $config.$field = v;
        }
    };
}

/// Apply file config to `config` (only fields present in the file). Call before applying CLI flags.
pub fn apply_file_to_config(file: &BatchflowToml, config: &mut PipelineConfig) {
    let section = &file.pipeline;
    apply_file_opt!(section, config, queue_capacity);
    apply_file_opt!(section, config, batch_size);
    apply_file_opt!(section, config, workers);
    apply_file_opt!(section, config, log_step);
    apply_file_opt!(section, config, out_discard);
    if let Some(secs) = section.tick_secs {
        config.tick_interval = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(secs) = section.deadline_secs {
        config.deadline = (secs > 0).then(|| Duration::from_secs(secs));
    }
}
