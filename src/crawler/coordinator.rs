//! Crawler coordinator - main crawl orchestration logic
//!
//! Runs one loop per task, all loops concurrently. Each loop:
//! - Walks its ID range in increasing order
//! - Admits at most `threads` profiles at a time, waiting for a slot
//! - Pauses the task when disk space runs low
//! - Persists the task checkpoint as work is dispatched and completes
//! - Drains and archives each finished range of `archive-step` IDs
//! - Stops dispatching on shutdown and waits a grace period for running work

use crate::archive::{ArchiveRange, Archiver};
use crate::config::{CheckpointMode, Config, CrawlerConfig};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::gate::AdmissionGate;
use crate::crawler::processor::{ProfileOutcome, ProfileProcessor};
use crate::crawler::registry::{SiteEntry, SiteRegistry};
use crate::model::{Site, StorageLayout, Task};
use crate::state::{ProgressTracker, TaskStore};
use crate::storage::{DiskMonitor, StatsLog};
use crate::Result;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Scheduling knobs for the task loops
#[derive(Debug, Clone, Copy)]
pub struct CrawlSettings {
    /// Profiles in flight per task
    pub concurrency: usize,

    /// IDs per archive; zero disables archiving while crawling
    pub archive_step: u64,

    pub checkpoint: CheckpointMode,

    /// How long running profiles may finish after shutdown is requested
    pub shutdown_grace: Duration,
}

impl CrawlSettings {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            concurrency: config.threads as usize,
            archive_step: config.archive_step,
            checkpoint: config.checkpoint,
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
        }
    }
}

/// How a task loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Every ID of the range was processed
    Completed,

    /// Disk space ran low before `at` was dispatched
    PausedLowDisk { at: u64 },

    /// Shutdown was requested
    Interrupted,
}

/// Per-task counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub saved: usize,
    pub rejected: usize,
    pub skipped: usize,

    /// Profiles cancelled at shutdown; they are retried on the next run
    pub aborted: usize,
}

/// Summary of one task loop
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub index: usize,
    pub site: Site,
    pub outcome: TaskOutcome,

    /// The `begin-id` a restart resumes from
    pub checkpoint: u64,

    pub stats: CrawlStats,

    /// Most profiles of this task in flight at once
    pub peak_concurrency: usize,
}

/// Main crawler coordinator structure
#[derive(Clone)]
pub struct Coordinator {
    settings: CrawlSettings,
    registry: Arc<SiteRegistry>,
    processor: Arc<ProfileProcessor>,
    archiver: Arc<Archiver>,
    store: Arc<TaskStore>,
    shutdown: CancellationToken,
}

impl Coordinator {
    /// Creates a coordinator from its parts
    ///
    /// The archiver's disk monitor also gates dispatching.
    pub fn new(
        settings: CrawlSettings,
        registry: SiteRegistry,
        processor: ProfileProcessor,
        archiver: Archiver,
        store: Arc<TaskStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            registry: Arc::new(registry),
            processor: Arc::new(processor),
            archiver: Arc::new(archiver),
            store,
            shutdown,
        }
    }

    /// Creates a coordinator from the configuration
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
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(HarvestError)` - Bad site override or HTTP client setup failure
    pub fn from_config(
        config: &Config,
        store: Arc<TaskStore>,
        disk: Arc<dyn DiskMonitor>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let registry = SiteRegistry::from_config(config)?;
        let fetcher = Arc::new(Fetcher::from_config(config)?);

        let layout = StorageLayout::new(&config.paths.data_folder);
        let processor = ProfileProcessor::new(
            fetcher,
            layout.clone(),
            Arc::new(StatsLog::new(layout.clone())),
            config.crawler.valid_image_count as usize,
            config.crawler.image_concurrency as usize,
        );
        let archiver = Archiver::new(
            layout,
            &config.paths.archive_folder,
            config.paths.tmp_folder.as_ref().map(PathBuf::from),
            disk,
        );

        Ok(Self::new(
            CrawlSettings::from_config(&config.crawler),
            registry,
            processor,
            archiver,
            store,
            shutdown,
        ))
    }

    /// Runs every task of the store to completion, pause, or shutdown
    ///
    /// Every task's site is checked against the registry before any crawling
    /// starts; an unregistered site is a fatal error.
    pub async fn run(&self) -> Result<Vec<TaskReport>> {
        let tasks = self.store.tasks().await;
        for task in &tasks {
            self.registry.get(task.site())?;
        }

        tracing::info!("Starting {} task loops", tasks.len());

        let mut loops = JoinSet::new();
        for (index, task) in tasks.into_iter().enumerate() {
            let coordinator = self.clone();
            loops.spawn(async move { coordinator.run_task(index, task).await });
        }

        let mut reports = Vec::new();
        let mut first_error = None;
        while let Some(joined) = loops.join_next().await {
            match joined {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => {
                    tracing::error!("Task loop failed: {}", e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(e) => tracing::error!("Task loop panicked: {}", e),
            }
        }

        if let Err(e) = self.store.persist().await {
            tracing::error!("Failed to save tasks: {}", e);
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        reports.sort_by_key(|report| report.index);
        Ok(reports)
    }

    /// Runs the loop of task `index`
    pub async fn run_task(&self, index: usize, task: Task) -> Result<TaskReport> {
        let entry = self.registry.get(task.site())?.clone();
        let range = *task.range();
        let step = self.settings.archive_step;
        let disk = self.archiver.disk().clone();

        let gate = AdmissionGate::new(self.settings.concurrency);
        let mut progress = ProgressTracker::new(self.settings.checkpoint, range.begin_id);
        let mut saved_checkpoint = range.begin_id;
        let mut units = Units::default();
        let mut stats = CrawlStats::default();
        let mut outcome = TaskOutcome::Completed;

        tracing::info!(
            "Task {}: crawling {} ids {}..{} with {} workers",
            index,
            entry.site,
            range.begin_id,
            range.end_id,
            gate.limit()
        );

        for id in range.begin_id..range.end_id {
            if self.shutdown.is_cancelled() {
                outcome = TaskOutcome::Interrupted;
                break;
            }
            let available = disk.available_bytes();
            if available < disk.min_free_bytes() {
                tracing::warn!(
                    "Task {}: disk space low ({} bytes free), pausing before id {}",
                    index,
                    available,
                    id
                );
                outcome = TaskOutcome::PausedLowDisk { at: id };
                break;
            }

            let admission = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    outcome = TaskOutcome::Interrupted;
                    break;
                }
                admission = gate.admit() => admission,
            };
            let Some(admission) = admission else {
                break;
            };

            let processor = self.processor.clone();
            let unit_entry = entry.clone();
            units.spawn(id, async move {
                let _admission = admission;
                processor.process(&unit_entry, id).await
            });
            progress.dispatched(id);

            for (done, result) in units.reap().await {
                record(&mut progress, &mut stats, done, result);
            }
            self.save_checkpoint(index, &progress, &mut saved_checkpoint).await;

            if step > 0 && (id + 1) % step == 0 {
                tracing::debug!(
                    "Task {}: range ending at {} dispatched, waiting for {} active profiles",
                    index,
                    id + 1,
                    gate.active()
                );
                for (done, result) in units.wait_all(&self.shutdown).await {
                    record(&mut progress, &mut stats, done, result);
                }
                self.save_checkpoint(index, &progress, &mut saved_checkpoint).await;

                // Units left after a shutdown get the grace period below
                if self.shutdown.is_cancelled() {
                    outcome = TaskOutcome::Interrupted;
                    break;
                }
                self.archive(&entry, ArchiveRange::ending_at(id + 1, step)).await;
            }
        }

        if progress.in_flight() > 0 {
            tracing::info!(
                "Task {}: waiting for {} profiles in flight",
                index,
                progress.in_flight()
            );
        }
        for (done, result) in units.wait_all(&self.shutdown).await {
            record(&mut progress, &mut stats, done, result);
        }

        // Only a shutdown leaves units running; they get a bounded wait
        if !units.is_empty() {
            if outcome == TaskOutcome::Completed {
                outcome = TaskOutcome::Interrupted;
            }
            let drained = units.drain(Instant::now() + self.settings.shutdown_grace).await;
            for (done, result) in drained.finished {
                record(&mut progress, &mut stats, done, result);
            }
            if !drained.aborted.is_empty() {
                tracing::warn!(
                    "Task {}: cancelled {} profiles after the grace period",
                    index,
                    drained.aborted.len()
                );
                stats.aborted = drained.aborted.len();
            }
        }
        self.save_checkpoint(index, &progress, &mut saved_checkpoint).await;

        tracing::info!(
            "Task {} ({}) {:?}: {} saved, {} rejected, {} skipped, resume at {}",
            index,
            entry.site,
            outcome,
            stats.saved,
            stats.rejected,
            stats.skipped,
            progress.checkpoint()
        );

        Ok(TaskReport {
            index,
            site: entry.site,
            outcome,
            checkpoint: progress.checkpoint(),
            stats,
            peak_concurrency: gate.peak(),
        })
    }

    /// Persists the task checkpoint when it moved
    ///
    /// A failed write is logged; the next checkpoint retries it.
    async fn save_checkpoint(&self, index: usize, progress: &ProgressTracker, saved: &mut u64) {
        let checkpoint = progress.checkpoint();
        if checkpoint <= *saved {
            return;
        }

        match self.store.checkpoint(index, checkpoint).await {
            Ok(()) => *saved = checkpoint,
            Err(e) => tracing::error!(
                "Failed to persist checkpoint {} for task {}: {}",
                checkpoint,
                index,
                e
            ),
        }
    }

    async fn archive(&self, entry: &SiteEntry, range: ArchiveRange) {
        tracing::info!(
            "Archiving {} ids {}..{}",
            entry.directory,
            range.start,
            range.end
        );
        if let Err(e) = self.archiver.archive_range(&entry.directory, range).await {
            tracing::error!(
                "Archiving {} {} failed: {}",
                entry.directory,
                range.file_name(),
                e
            );
        }
    }
}

/// Marks one unit finished and counts its outcome
fn record(
    progress: &mut ProgressTracker,
    stats: &mut CrawlStats,
    id: u64,
    result: Option<ProfileOutcome>,
) {
    progress.completed(id);
    match result {
        Some(ProfileOutcome::Saved { .. }) => stats.saved += 1,
        Some(ProfileOutcome::Rejected { .. }) => stats.rejected += 1,
        Some(ProfileOutcome::Skipped { .. }) => stats.skipped += 1,
        None => {
            tracing::error!("Worker for id {} panicked", id);
            stats.skipped += 1;
        }
    }
}

/// Profile units spawned by one task loop, keyed by ID
#[derive(Debug, Default)]
struct Units {
    running: BTreeMap<u64, JoinHandle<ProfileOutcome>>,
}

#[derive(Debug, Default)]
struct Drained {
    /// `None` marks a unit that panicked
    finished: Vec<(u64, Option<ProfileOutcome>)>,
    aborted: Vec<u64>,
}

impl Units {
    fn spawn<F>(&mut self, id: u64, unit: F)
    where
        F: Future<Output = ProfileOutcome> + Send + 'static,
    {
        self.running.insert(id, tokio::spawn(unit));
    }

    fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// Collects the units that already finished, without waiting
    async fn reap(&mut self) -> Vec<(u64, Option<ProfileOutcome>)> {
        let done: Vec<u64> = self
            .running
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(id, _)| *id)
            .collect();

        let mut finished = Vec::with_capacity(done.len());
        for id in done {
            if let Some(handle) = self.running.remove(&id) {
                finished.push((id, handle.await.ok()));
            }
        }
        finished
    }

    /// Waits for units in ID order until all finish or `shutdown` is cancelled
    ///
    /// Units still running at cancellation stay in the set.
    async fn wait_all(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Vec<(u64, Option<ProfileOutcome>)> {
        let mut finished = Vec::new();
        while let Some((&id, handle)) = self.running.iter_mut().next() {
            let result = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = handle => result,
            };
            self.running.remove(&id);
            finished.push((id, result.ok()));
        }
        finished
    }

    /// Waits for every unit, aborting whatever is still running at `deadline`
    async fn drain(&mut self, deadline: Instant) -> Drained {
        let mut drained = Drained::default();

        for (id, mut handle) in std::mem::take(&mut self.running) {
            match tokio::time::timeout_at(deadline, &mut handle).await.ok() {
                Some(result) => drained.finished.push((id, result.ok())),
                None => {
                    handle.abort();
                    drained.aborted.push(id);
                }
            }
        }

        drained
    }
}
