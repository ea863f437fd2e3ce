//! Archive module for compacting finished ID ranges
//!
//! This module handles:
//! - Packing every file of an ID range into a `.tar.gz`
//! - Deleting the packed source directories, only after packing succeeded
//! - Sweeping a site's data folder for finished ranges left unarchived

mod packer;
mod sweep;

pub use packer::{archive_and_purge, ArchiveOutcome, ArchiveRange, Archiver};
pub use sweep::{RangeSweep, SweepReport, SweepStatus};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while archiving a range
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Low disk space: {available} bytes available, {required} required")]
    LowDiskSpace { available: u64, required: u64 },

    /// Packing failed; no source file was deleted
    #[error("Failed to pack {archive}: {source}")]
    Pack {
        archive: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to delete {path} after archiving: {source}")]
    Purge {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Sweep status error: {0}")]
    Status(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive worker failed: {0}")]
    Worker(String),
}
