//! Configuration module for the harvest engine
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every recognized option is a typed field with a default; validation runs
//! exactly once, when the file is loaded.
//!
//! # Example
//!
//! ```no_run
//! use harvest_engine::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvest will write under: {}", config.output.root.display());
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    ApiSampleConfig, BulkConfig, Config, CrawlConfig, FetchConfig, OutputConfig, ScopeConfig,
};

pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, parse_config, parse_timestamp,
};
pub use validation::validate;
