use crate::model::Site;
use serde::Deserialize;
use std::collections::HashMap;

/// Main configuration structure for Avatar-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path of the JSON task state file
    #[serde(rename = "task-file")]
    pub task_file: String,

    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub disk: DiskConfig,

    /// Per-site overrides applied on top of the built-in registry
    #[serde(default)]
    pub sites: HashMap<Site, SiteOverride>,
}

/// When the task checkpoint advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointMode {
    /// Checkpoint the last dispatched ID, even if its work is still in flight
    Dispatched,
    /// Checkpoint the last ID of the contiguous completed prefix
    #[default]
    Completed,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of profiles processed concurrently per task
    pub threads: u32,

    /// Minimum number of extracted images for a profile to be saved
    #[serde(rename = "valid-image-count")]
    pub valid_image_count: u32,

    /// Number of consecutive IDs packed into one archive
    #[serde(rename = "archive-step", default = "default_archive_step")]
    pub archive_step: u64,

    /// Maximum number of concurrent image downloads per profile
    #[serde(rename = "image-concurrency", default = "default_image_concurrency")]
    pub image_concurrency: u32,

    #[serde(default)]
    pub checkpoint: CheckpointMode,

    /// Time in-flight work is given to finish after a stop signal
    #[serde(rename = "shutdown-grace-secs", default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// HTTP transport and retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct NetworkConfig {
    /// Proxy URLs; only the first one is used
    pub proxies: Vec<String>,

    /// Attempts per request before giving up
    pub max_retries: u32,

    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,

    /// Jitter as a fraction of the backoff (0.0 - 1.0)
    pub jitter: f64,

    /// Consecutive failures before a host's circuit opens
    pub breaker_threshold: u32,
    pub breaker_cooldown_secs: u64,

    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxies: Vec::new(),
            max_retries: 10,
            initial_backoff_ms: 200,
            max_backoff_ms: 10_000,
            jitter: 0.2,
            breaker_threshold: 30,
            breaker_cooldown_secs: 30,
            timeout_secs: 30,
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Root of the per-site profile directories
    #[serde(rename = "data-folder")]
    pub data_folder: String,

    /// Root of the per-site archive directories
    #[serde(rename = "archive-folder")]
    pub archive_folder: String,

    /// Staging directory for archives being written
    #[serde(rename = "tmp-folder", default)]
    pub tmp_folder: Option<String>,
}

/// Disk-space gate configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DiskConfig {
    /// Work pauses when less than this many bytes are available
    #[serde(rename = "min-free-bytes")]
    pub min_free_bytes: u64,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            min_free_bytes: 1024 * 1024 * 1024,
        }
    }
}

/// Overrides for one registered site
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteOverride {
    /// Profile URL template; `{id}` is replaced by the profile ID
    #[serde(rename = "profile-url")]
    pub profile_url: Option<String>,

    /// Directory name under the data and archive folders
    pub directory: Option<String>,
}

fn default_archive_step() -> u64 {
    10_000
}

fn default_image_concurrency() -> u32 {
    8
}

fn default_shutdown_grace() -> u64 {
    10
}
