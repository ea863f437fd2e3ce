//! Configuration module for Avatar-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use avatar_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Archive step: {}", config.crawler.archive_step);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CheckpointMode, Config, CrawlerConfig, DiskConfig, NetworkConfig, PathsConfig, SiteOverride,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

pub(crate) use validation::validate_url_template;
