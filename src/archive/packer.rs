use super::ArchiveError;
use crate::model::layout::range_dirs;
use crate::model::StorageLayout;
use crate::storage::DiskMonitor;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Half-open ID range `[start, end)` packed into one archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveRange {
    pub start: u64,
    pub end: u64,
}

impl ArchiveRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// The range of `step` IDs ending just before `boundary`
    pub fn ending_at(boundary: u64, step: u64) -> Self {
        Self::new(boundary.saturating_sub(step), boundary)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Archive file name, `<start>-<end - 1>.tar.gz`
    pub fn file_name(&self) -> String {
        format!("{}-{}.tar.gz", self.start, self.end.saturating_sub(1))
    }
}

/// Result of one archiving pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// A new archive was written and its sources deleted
    Archived { path: PathBuf, files: usize },

    /// The archive already existed; leftover sources were deleted
    AlreadyArchived { path: PathBuf, purged: usize },

    /// No source directory existed for the range
    NothingToArchive,
}

/// Packs finished ID ranges of the data folder into the archive folder
#[derive(Clone)]
pub struct Archiver {
    layout: StorageLayout,
    archive_dir: PathBuf,
    staging_dir: Option<PathBuf>,
    disk: Arc<dyn DiskMonitor>,
}

impl std::fmt::Debug for Archiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archiver")
            .field("layout", &self.layout)
            .field("archive_dir", &self.archive_dir)
            .field("staging_dir", &self.staging_dir)
            .finish_non_exhaustive()
    }
}

impl Archiver {
    /// Creates an archiver
    ///
    /// # Arguments
    ///
    /// * `layout` - Layout of the data folder being archived
    /// * `archive_dir` - Destination folder; one subfolder per site
    /// * `staging_dir` - Where partial archives are written, if not next to the result
    /// * `disk` - Space check consulted before packing
    pub fn new(
        layout: StorageLayout,
        archive_dir: impl Into<PathBuf>,
        staging_dir: Option<PathBuf>,
        disk: Arc<dyn DiskMonitor>,
    ) -> Self {
        Self {
            layout,
            archive_dir: archive_dir.into(),
            staging_dir,
            disk,
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn disk(&self) -> &Arc<dyn DiskMonitor> {
        &self.disk
    }

    /// Where the archive of `range` for a site ends up
    pub fn archive_path(&self, site_dir: &str, range: ArchiveRange) -> PathBuf {
        self.archive_dir.join(site_dir).join(range.file_name())
    }

    /// Archives one range of a site, then deletes its source directories
    ///
    /// Fails fast with [`ArchiveError::LowDiskSpace`] before touching anything
    /// when the disk is low. Packing runs on the blocking pool.
    pub async fn archive_range(
        &self,
        site_dir: &str,
        range: ArchiveRange,
    ) -> Result<ArchiveOutcome, ArchiveError> {
        if range.is_empty() {
            return Ok(ArchiveOutcome::NothingToArchive);
        }

        let available = self.disk.available_bytes();
        let required = self.disk.min_free_bytes();
        if available < required {
            tracing::error!(
                "Refusing to archive {} {}: low disk space",
                site_dir,
                range.file_name()
            );
            return Err(ArchiveError::LowDiskSpace {
                available,
                required,
            });
        }

        let base_dir = self.layout.site_dir(site_dir);
        let destination_dir = self.archive_dir.join(site_dir);
        let staging_dir = self.staging_dir.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            archive_and_purge(range, &base_dir, &destination_dir, staging_dir.as_deref())
        })
        .await
        .map_err(|e| ArchiveError::Worker(e.to_string()))??;

        match &outcome {
            ArchiveOutcome::Archived { path, files } => {
                tracing::info!("Archived {} files into {}", files, path.display())
            }
            ArchiveOutcome::AlreadyArchived { path, purged } => tracing::info!(
                "{} already exists, removed {} leftover directories",
                path.display(),
                purged
            ),
            ArchiveOutcome::NothingToArchive => {
                tracing::debug!("Nothing to archive for {} {}", site_dir, range.file_name())
            }
        }

        Ok(outcome)
    }
}

/// Packs every file of `range` under `base_dir` into
/// `<destination_dir>/<start>-<end-1>.tar.gz`, then deletes the sources
///
/// Entries are stored relative to `base_dir`. The archive is first written as
/// `<name>.partial` in `staging_dir` (or `destination_dir`) and renamed into
/// place once complete. Nothing is deleted unless packing succeeded. Running
/// again for a range that already has an archive only removes leftovers.
pub fn archive_and_purge(
    range: ArchiveRange,
    base_dir: &Path,
    destination_dir: &Path,
    staging_dir: Option<&Path>,
) -> Result<ArchiveOutcome, ArchiveError> {
    let archive_path = destination_dir.join(range.file_name());
    let sources: Vec<PathBuf> = range_dirs(range.start, range.end)
        .into_iter()
        .map(|dir| base_dir.join(dir))
        .filter(|dir| dir.is_dir())
        .collect();

    if archive_path.exists() {
        for dir in &sources {
            tracing::warn!(
                "{} already exists, deleting unpacked leftover {}",
                archive_path.display(),
                dir.display()
            );
        }
        let purged = purge(&sources, base_dir)?;
        return Ok(ArchiveOutcome::AlreadyArchived {
            path: archive_path,
            purged,
        });
    }

    if sources.is_empty() {
        return Ok(ArchiveOutcome::NothingToArchive);
    }

    fs::create_dir_all(destination_dir)?;
    let staging_dir = staging_dir.unwrap_or(destination_dir);
    fs::create_dir_all(staging_dir)?;
    let partial_path = staging_dir.join(format!("{}.partial", range.file_name()));

    let files = match pack(&partial_path, base_dir, &sources) {
        Ok(files) => files,
        Err(source) => {
            let _ = fs::remove_file(&partial_path);
            tracing::error!("Packing {} failed: {}", archive_path.display(), source);
            return Err(ArchiveError::Pack {
                archive: archive_path,
                source,
            });
        }
    };

    if let Err(source) = move_into_place(&partial_path, &archive_path) {
        let _ = fs::remove_file(&partial_path);
        return Err(ArchiveError::Pack {
            archive: archive_path,
            source,
        });
    }

    purge(&sources, base_dir)?;

    Ok(ArchiveOutcome::Archived {
        path: archive_path,
        files,
    })
}

/// Writes a gzip-compressed tar of `sources` and syncs it to disk
///
/// # Returns
///
/// The number of regular files packed
fn pack(archive: &Path, base_dir: &Path, sources: &[PathBuf]) -> io::Result<usize> {
    let file = File::create(archive)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mut files = 0;

    for dir in sources {
        append_dir(&mut builder, base_dir, dir, &mut files)?;
    }

    let encoder = builder.into_inner()?;
    let writer = encoder.finish()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    Ok(files)
}

fn append_dir<W: io::Write>(
    builder: &mut tar::Builder<W>,
    base_dir: &Path,
    dir: &Path,
    files: &mut usize,
) -> io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            append_dir(builder, base_dir, &path, files)?;
        } else if file_type.is_file() {
            let name = path
                .strip_prefix(base_dir)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            builder.append_path_with_name(&path, name)?;
            *files += 1;
        }
    }

    Ok(())
}

/// Renames the finished archive into place, copying across filesystems
fn move_into_place(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    let target = to.with_extension("gz.tmp");
    fs::copy(from, &target)?;
    File::open(&target)?.sync_all()?;
    fs::rename(&target, to)?;
    fs::remove_file(from)
}

/// Deletes the source directories and any bucket directories left empty
fn purge(sources: &[PathBuf], base_dir: &Path) -> Result<usize, ArchiveError> {
    for dir in sources {
        fs::remove_dir_all(dir).map_err(|source| ArchiveError::Purge {
            path: dir.clone(),
            source,
        })?;
    }

    for dir in sources {
        prune_empty_parents(dir, base_dir);
    }

    Ok(sources.len())
}

fn prune_empty_parents(dir: &Path, base_dir: &Path) {
    let mut current = dir.parent();
    while let Some(parent) = current {
        if parent == base_dir || !parent.starts_with(base_dir) {
            break;
        }
        // Fails on a non-empty directory, which ends the walk
        if fs::remove_dir(parent).is_err() {
            break;
        }
        current = parent.parent();
    }
}
