//! Disk-space gate
//!
//! The check is advisory: space can still run out between the check and the
//! write. The crawler uses it to pause a task and the archiver to refuse work
//! it might not be able to finish.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use sysinfo::Disks;

/// Reports the space available to the crawler's files
pub trait DiskMonitor: Send + Sync {
    /// Bytes currently available to unprivileged writers
    fn available_bytes(&self) -> u64;

    /// Threshold below which the disk counts as low
    fn min_free_bytes(&self) -> u64;

    fn is_low(&self) -> bool {
        self.available_bytes() < self.min_free_bytes()
    }
}

/// Reads free space of the filesystem holding `path` from the OS
///
/// The mount list is read once; each check refreshes only the owning disk.
pub struct SystemDisk {
    path: PathBuf,
    min_free_bytes: u64,
    disks: Mutex<Disks>,
}

impl SystemDisk {
    pub fn new(path: impl Into<PathBuf>, min_free_bytes: u64) -> Self {
        Self {
            path: path.into(),
            min_free_bytes,
            disks: Mutex::new(Disks::new_with_refreshed_list()),
        }
    }

    /// Resolves the watched path, falling back to the nearest existing ancestor
    fn resolved_path(&self) -> Option<PathBuf> {
        let mut candidate: &Path = &self.path;
        loop {
            if let Ok(path) = candidate.canonicalize() {
                return Some(path);
            }
            candidate = match candidate.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => return std::env::current_dir().ok(),
            };
        }
    }
}

impl fmt::Debug for SystemDisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemDisk")
            .field("path", &self.path)
            .field("min_free_bytes", &self.min_free_bytes)
            .finish_non_exhaustive()
    }
}

impl DiskMonitor for SystemDisk {
    fn available_bytes(&self) -> u64 {
        let Some(path) = self.resolved_path() else {
            tracing::warn!("Cannot resolve {} for disk check", self.path.display());
            return 0;
        };

        let mut disks = self.disks.lock().unwrap_or_else(PoisonError::into_inner);
        let mut owner = owning_mount(&path, disks.list().iter().map(|disk| disk.mount_point()));
        if owner.is_none() {
            // Mounted after start-up
            *disks = Disks::new_with_refreshed_list();
            owner = owning_mount(&path, disks.list().iter().map(|disk| disk.mount_point()));
        }

        match owner.and_then(|index| disks.list_mut().get_mut(index)) {
            Some(disk) => {
                disk.refresh();
                disk.available_space()
            }
            None => {
                tracing::warn!("No mounted disk found for {}", path.display());
                0
            }
        }
    }

    fn min_free_bytes(&self) -> u64 {
        self.min_free_bytes
    }
}

/// Index of the mount point with the longest prefix of `path`
fn owning_mount<'a>(path: &Path, mounts: impl Iterator<Item = &'a Path>) -> Option<usize> {
    mounts
        .enumerate()
        .filter(|(_, mount)| path.starts_with(mount))
        .max_by_key(|(_, mount)| mount.as_os_str().len())
        .map(|(index, _)| index)
}

/// A disk whose free space is set by hand
///
/// Used by dry runs and tests to simulate space running out.
#[derive(Debug)]
pub struct ManualDisk {
    available: AtomicU64,
    min_free_bytes: u64,
}

impl ManualDisk {
    pub fn new(available: u64, min_free_bytes: u64) -> Self {
        Self {
            available: AtomicU64::new(available),
            min_free_bytes,
        }
    }

    /// A disk that never reports low space
    pub fn unlimited() -> Self {
        Self::new(u64::MAX, 0)
    }

    pub fn set_available(&self, bytes: u64) {
        self.available.store(bytes, Ordering::SeqCst);
    }
}

impl DiskMonitor for ManualDisk {
    fn available_bytes(&self) -> u64 {
        self.available.load(Ordering::SeqCst)
    }

    fn min_free_bytes(&self) -> u64 {
        self.min_free_bytes
    }
}
