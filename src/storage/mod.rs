//! Local storage concerns shared by the crawler and the archiver
//!
//! - Disk-space monitoring used to pause crawling and refuse archiving
//! - The per-bucket stats log appended for every saved profile

mod disk;
mod stats;

pub use disk::{DiskMonitor, ManualDisk, SystemDisk};
pub use stats::StatsLog;
