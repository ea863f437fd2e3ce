//! Offline range sweep
//!
//! Walks a site's data folder in fixed steps and archives every range that
//! lies wholly below the bucket the crawler is currently filling (or below an
//! explicit stop ID). Progress is kept in a small JSON status file so an
//! interrupted sweep resumes where it stopped.

use super::{ArchiveError, ArchiveOutcome, ArchiveRange, Archiver};
use crate::model::layout::GROUP_STEP;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the status file inside the archive folder
pub const STATUS_FILE: &str = "sweep.status.json";

/// Persisted sweep progress, per site directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SweepStatus {
    /// Exclusive end of the last range archived, per site
    #[serde(default)]
    pub last_end: BTreeMap<String, u64>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SweepStatus {
    /// Loads the status file; a missing file is a fresh sweep
    pub fn load(path: &Path) -> Result<Self, ArchiveError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the status through a temporary file
    pub fn save(&self, path: &Path) -> Result<(), ArchiveError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn last_end(&self, site_dir: &str) -> u64 {
        self.last_end.get(site_dir).copied().unwrap_or(0)
    }
}

/// Summary of one site's sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub archived: usize,
    pub already_archived: usize,
    pub empty: usize,

    /// Exclusive end of the last range handled
    pub last_end: u64,

    /// The sweep stopped early because the disk ran low
    pub stopped_low_disk: bool,
}

/// Archives finished ranges left behind in the data folder
#[derive(Debug, Clone)]
pub struct RangeSweep {
    archiver: Archiver,
    status_path: PathBuf,
    step: u64,
}

impl RangeSweep {
    /// Creates a sweep over `archiver`'s data folder
    ///
    /// The status file lives at `<archive_dir>/sweep.status.json`.
    pub fn new(archiver: Archiver, archive_dir: &Path, step: u64) -> Self {
        Self {
            archiver,
            status_path: archive_dir.join(STATUS_FILE),
            step: step.max(1),
        }
    }

    pub fn status_path(&self) -> &Path {
        &self.status_path
    }

    /// Sweeps one site
    ///
    /// # Arguments
    ///
    /// * `site_dir` - Site directory name
    /// * `stop_id` - Archive only ranges ending at or before this ID; defaults
    ///   to the first ID of the highest bucket on disk
    pub async fn sweep_site(
        &self,
        site_dir: &str,
        stop_id: Option<u64>,
    ) -> Result<SweepReport, ArchiveError> {
        let mut status = SweepStatus::load(&self.status_path)?;
        let mut start = status.last_end(site_dir);
        let mut report = SweepReport {
            last_end: start,
            ..SweepReport::default()
        };

        let stop = match stop_id {
            Some(stop) => stop,
            None => {
                let site_base = self.archiver.layout().site_dir(site_dir);
                match highest_bucket_start(&site_base)? {
                    Some(stop) => stop,
                    None => {
                        tracing::info!("No data for {}, nothing to sweep", site_dir);
                        return Ok(report);
                    }
                }
            }
        };
        tracing::info!("Sweeping {} from {} up to {}", site_dir, start, stop);

        while start + self.step <= stop {
            if self.archiver.disk().is_low() {
                tracing::warn!("Disk space low, stopping sweep of {} at {}", site_dir, start);
                report.stopped_low_disk = true;
                break;
            }

            let range = ArchiveRange::new(start, start + self.step);
            match self.archiver.archive_range(site_dir, range).await? {
                ArchiveOutcome::Archived { .. } => report.archived += 1,
                ArchiveOutcome::AlreadyArchived { .. } => report.already_archived += 1,
                ArchiveOutcome::NothingToArchive => report.empty += 1,
            }

            start = range.end;
            report.last_end = start;
            status.last_end.insert(site_dir.to_string(), start);
            status.updated_at = Some(Utc::now());
            status.save(&self.status_path)?;
        }

        tracing::info!(
            "Sweep of {} done: {} archived, {} already archived, {} empty",
            site_dir,
            report.archived,
            report.already_archived,
            report.empty
        );
        Ok(report)
    }
}

/// First ID of the highest `a/b` bucket under a site directory
///
/// Non-numeric entries (such as the stats folder) are ignored.
pub fn highest_bucket_start(site_base: &Path) -> io::Result<Option<u64>> {
    let Some(top) = highest_numeric_dir(site_base)? else {
        return Ok(None);
    };
    let middle = highest_numeric_dir(&site_base.join(top.to_string()))?.unwrap_or(0);
    Ok(Some(top * 1_000_000 + middle * GROUP_STEP))
}

fn highest_numeric_dir(dir: &Path) -> io::Result<Option<u64>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut highest = None;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(value) = entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok()) {
            highest = highest.max(Some(value));
        }
    }
    Ok(highest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::layout::id_path;
    use crate::model::StorageLayout;
    use crate::storage::ManualDisk;
    use std::sync::Arc;

    fn write_profile(layout: &StorageLayout, site: &str, id: u64) {
        let dir = layout.profile_dir(site, id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.html", id)), b"page").unwrap();
    }

    fn sweep(data: &Path, archive: &Path, step: u64, disk: Arc<ManualDisk>) -> RangeSweep {
        let archiver = Archiver::new(StorageLayout::new(data), archive, None, disk);
        RangeSweep::new(archiver, archive, step)
    }

    #[test]
    fn test_highest_bucket_start() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(highest_bucket_start(dir.path()).unwrap(), None);

        for id in [5u64, 2_003_004, 2_017_000, 1_999_999] {
            fs::create_dir_all(dir.path().join(id_path(id))).unwrap();
        }
        fs::create_dir_all(dir.path().join("stats")).unwrap();

        assert_eq!(highest_bucket_start(dir.path()).unwrap(), Some(2_017_000));
    }

    #[tokio::test]
    async fn test_sweep_archives_finished_ranges() {
        let data = tempfile::tempdir().unwrap();
        let archive = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(data.path());
        for id in [3u64, 15, 27, 31] {
            write_profile(&layout, "Baihe", id);
        }

        let sweep = sweep(data.path(), archive.path(), 10, Arc::new(ManualDisk::unlimited()));
        let report = sweep.sweep_site("Baihe", Some(30)).await.unwrap();

        assert_eq!(report.archived, 3);
        assert_eq!(report.last_end, 30);
        assert!(archive.path().join("Baihe/0-9.tar.gz").exists());
        assert!(archive.path().join("Baihe/20-29.tar.gz").exists());
        assert!(!archive.path().join("Baihe/30-39.tar.gz").exists());
        assert!(layout.page_path("Baihe", 31).exists());

        let status = SweepStatus::load(sweep.status_path()).unwrap();
        assert_eq!(status.last_end("Baihe"), 30);
        assert!(status.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_sweep_resumes_from_status() {
        let data = tempfile::tempdir().unwrap();
        let archive = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(data.path());
        write_profile(&layout, "Baihe", 5);
        write_profile(&layout, "Baihe", 25);

        let mut status = SweepStatus::default();
        status.last_end.insert("Baihe".to_string(), 20);
        status.save(&archive.path().join(STATUS_FILE)).unwrap();

        let sweep = sweep(data.path(), archive.path(), 10, Arc::new(ManualDisk::unlimited()));
        let report = sweep.sweep_site("Baihe", Some(30)).await.unwrap();

        assert_eq!(report.archived, 1);
        assert!(layout.page_path("Baihe", 5).exists());
        assert!(!layout.page_path("Baihe", 25).exists());
    }

    #[tokio::test]
    async fn test_sweep_stops_below_current_bucket() {
        let data = tempfile::tempdir().unwrap();
        let archive = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(data.path());
        write_profile(&layout, "Jiayuan", 500);
        write_profile(&layout, "Jiayuan", 1_200);

        let sweep = sweep(data.path(), archive.path(), 1_000, Arc::new(ManualDisk::unlimited()));
        let report = sweep.sweep_site("Jiayuan", None).await.unwrap();

        assert_eq!(report.archived, 1);
        assert_eq!(report.last_end, 1_000);
        assert!(archive.path().join("Jiayuan/0-999.tar.gz").exists());
        assert!(layout.page_path("Jiayuan", 1_200).exists());
    }

    #[tokio::test]
    async fn test_sweep_stops_on_low_disk() {
        let data = tempfile::tempdir().unwrap();
        let archive = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(data.path());
        write_profile(&layout, "Baihe", 5);

        let disk = Arc::new(ManualDisk::new(0, 1));
        let sweep = sweep(data.path(), archive.path(), 10, disk);
        let report = sweep.sweep_site("Baihe", Some(100)).await.unwrap();

        assert!(report.stopped_low_disk);
        assert_eq!(report.last_end, 0);
        assert!(layout.page_path("Baihe", 5).exists());
    }
}
