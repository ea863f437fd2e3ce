//! Avatar-Harvest main entry point
//!
//! This is the command-line interface for the Avatar-Harvest profile crawler.

use anyhow::Context;
use avatar_harvest::archive::{Archiver, RangeSweep};
use avatar_harvest::config::{load_config_with_hash, Config};
use avatar_harvest::crawler::{crawl, SiteRegistry, TaskOutcome};
use avatar_harvest::model::StorageLayout;
use avatar_harvest::state::TaskStore;
use avatar_harvest::storage::{DiskMonitor, SystemDisk};
use clap::Parser;
use std::collections::BTreeSet;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Avatar-Harvest: a resumable profile image crawler
///
/// Walks the ID ranges listed in the task file, saves every profile with
/// enough images, and packs finished ranges into compressed archives.
/// Progress is checkpointed in the task file so an interrupted run resumes.
#[derive(Parser, Debug)]
#[command(name = "avatar-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable profile image crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "harvest.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and task file and show what would be crawled
    #[arg(long, conflicts_with = "sweep")]
    dry_run: bool,

    /// Archive finished ranges left in the data folder instead of crawling
    #[arg(long)]
    sweep: bool,

    /// With --sweep, archive only ranges ending at or before this ID
    #[arg(long, value_name = "ID", requires = "sweep")]
    stop_id: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let task_path = PathBuf::from(&config.task_file);
    let store = TaskStore::load(&task_path)
        .with_context(|| format!("Failed to load tasks from {}", task_path.display()))?;

    if cli.dry_run {
        return handle_dry_run(&config, &store).await;
    }

    let disk: Arc<dyn DiskMonitor> = Arc::new(SystemDisk::new(
        &config.paths.data_folder,
        config.disk.min_free_bytes,
    ));

    if cli.sweep {
        handle_sweep(&config, &store, disk, cli.stop_id).await
    } else {
        handle_crawl(&config, store, disk).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("avatar_harvest=info,warn"),
            1 => EnvFilter::new("avatar_harvest=debug,info"),
            2 => EnvFilter::new("avatar_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Cancels `shutdown` on SIGINT or SIGTERM
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::warn!("Shutdown requested, finishing profiles in flight");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = wait_for_ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            wait_for_ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    until_signal(tokio::signal::ctrl_c(), "Ctrl-C").await;
}

/// Resolves when `signal` fires; never resolves if listening failed
async fn until_signal<F>(signal: F, name: &str)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!("Cannot listen for {}: {}", name, e);
        std::future::pending::<()>().await;
    }
}

/// Handles the --dry-run mode: validates everything, touches nothing
async fn handle_dry_run(config: &Config, store: &TaskStore) -> anyhow::Result<()> {
    let registry = SiteRegistry::from_config(config)?;
    let tasks = store.tasks().await;

    println!("=== Avatar-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Threads per task: {}", config.crawler.threads);
    println!("  Valid image count: {}", config.crawler.valid_image_count);
    println!("  Archive step: {}", config.crawler.archive_step);
    println!("  Image concurrency: {}", config.crawler.image_concurrency);
    println!("  Checkpoint: {:?}", config.crawler.checkpoint);

    println!("\nPaths:");
    println!("  Data: {}", config.paths.data_folder);
    println!("  Archive: {}", config.paths.archive_folder);
    if let Some(tmp) = &config.paths.tmp_folder {
        println!("  Staging: {}", tmp);
    }
    println!("  Minimum free space: {} bytes", config.disk.min_free_bytes);

    match config.network.proxies.first() {
        Some(proxy) => println!("\nProxy: {}", proxy),
        None => println!("\nProxy: none"),
    }

    println!("\nTasks ({}) from {}:", tasks.len(), store.path().display());
    for (index, task) in tasks.iter().enumerate() {
        let range = task.range();
        let entry = registry.get(task.site())?;
        println!(
            "  [{}] {} ids {}..{} ({} ids) -> {}/{}",
            index,
            task.site(),
            range.begin_id,
            range.end_id,
            range.len(),
            config.paths.data_folder,
            entry.directory
        );
        if !range.is_empty() {
            println!("      first URL: {}", entry.profile_url(range.begin_id));
        }
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would crawl {} ids",
        tasks.iter().map(|task| task.range().len()).sum::<u64>()
    );

    Ok(())
}

/// Handles the --sweep mode: archives finished ranges of every task's site
async fn handle_sweep(
    config: &Config,
    store: &TaskStore,
    disk: Arc<dyn DiskMonitor>,
    stop_id: Option<u64>,
) -> anyhow::Result<()> {
    let registry = SiteRegistry::from_config(config)?;
    let mut directories = BTreeSet::new();
    for task in store.tasks().await {
        directories.insert(registry.get(task.site())?.directory.clone());
    }

    let archive_dir = Path::new(&config.paths.archive_folder);
    let archiver = Archiver::new(
        StorageLayout::new(&config.paths.data_folder),
        archive_dir,
        config.paths.tmp_folder.as_ref().map(PathBuf::from),
        disk,
    );
    let sweep = RangeSweep::new(archiver, archive_dir, config.crawler.archive_step);

    for directory in &directories {
        let report = sweep
            .sweep_site(directory, stop_id)
            .await
            .with_context(|| format!("Sweep of {} failed", directory))?;

        println!(
            "{}: {} archived, {} already archived, {} empty, swept up to {}",
            directory, report.archived, report.already_archived, report.empty, report.last_end
        );
        if report.stopped_low_disk {
            tracing::warn!("Sweep stopped early: disk space low");
            break;
        }
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: &Config,
    store: TaskStore,
    disk: Arc<dyn DiskMonitor>,
) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    tracing::info!(
        "Starting crawl: {} threads per task, archive step {}",
        config.crawler.threads,
        config.crawler.archive_step
    );

    let reports = match crawl(config, Arc::new(store), disk, shutdown).await {
        Ok(reports) => reports,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    for report in &reports {
        match report.outcome {
            TaskOutcome::Completed => tracing::info!(
                "Task {} ({}) completed, {} profiles saved",
                report.index,
                report.site,
                report.stats.saved
            ),
            TaskOutcome::PausedLowDisk { at } => tracing::warn!(
                "Task {} ({}) paused at id {}: low disk space",
                report.index,
                report.site,
                at
            ),
            TaskOutcome::Interrupted => tracing::info!(
                "Task {} ({}) interrupted, resumes at id {}",
                report.index,
                report.site,
                report.checkpoint
            ),
        }
    }

    Ok(())
}
