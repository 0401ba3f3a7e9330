pub mod batchflow_toml;
pub mod config;
pub mod logger;

pub use batchflow_toml::{
    BatchflowToml, apply_file_to_config, load_batchflow_toml, parse_batchflow_toml,
};
pub use config::*;
pub use logger::{parse_level, setup_logging};
