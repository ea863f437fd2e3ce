//! Crawler module for profile fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry, backoff, and per-host circuit breaking
//! - Per-site image extraction
//! - Bounded concurrent processing of profile IDs
//! - Overall crawl coordination, checkpointing, and archiving

mod coordinator;
mod extract;
mod fetcher;
mod gate;
mod processor;
mod registry;
mod retry;

pub use coordinator::{Coordinator, CrawlSettings, CrawlStats, TaskOutcome, TaskReport};
pub use extract::{parse_document, BaiheExtractor, ImageExtractor, JiayuanExtractor};
pub use fetcher::{build_http_client, user_agent_string, FetchError, FetchResponse, Fetcher};
pub use gate::{Admission, AdmissionGate};
pub use processor::{ProfileOutcome, ProfileProcessor};
pub use registry::{SiteEntry, SiteRegistry};
pub use retry::{CircuitBreaker, RetryPolicy};

use crate::config::Config;
use crate::state::TaskStore;
use crate::storage::DiskMonitor;
use crate::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Build the site registry and HTTP client
/// 2. Check every task's site
/// 3. Run all task loops until they finish, pause, or are cancelled
/// 4. Save the task file
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `store` - Loaded task file
/// * `disk` - Free space check for the data folder
/// * `shutdown` - Cancelled when the process should stop
///
/// # Returns
///
/// * `Ok(Vec<TaskReport>)` - One report per task, in task file order
/// * `Err(HarvestError)` - Setup failed or a task names an unknown site
pub async fn crawl(
    config: &Config,
    store: Arc<TaskStore>,
    disk: Arc<dyn DiskMonitor>,
    shutdown: CancellationToken,
) -> Result<Vec<TaskReport>> {
    let coordinator = Coordinator::from_config(config, store, disk, shutdown)?;
    coordinator.run().await
}
