//! Avatar-Harvest: a resumable profile image crawler
//!
//! This crate walks numerically indexed profile pages on a set of sites,
//! downloads the images each profile links to, and packs finished ID ranges
//! into compressed archives so disk usage stays bounded during long crawls.

pub mod archive;
pub mod config;
pub mod crawler;
pub mod model;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Avatar-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Archive error: {0}")]
    Archive(#[from] archive::ArchiveError),

    #[error("Task state error: {0}")]
    State(#[from] state::StateError),

    #[error("No extraction strategy registered for site '{0}'")]
    UnknownSite(model::Site),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Avatar-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use model::{IdRange, Site, Task};
