//! Per-bucket stats log
//!
//! Every saved profile appends `id<TAB>imageCount` to the stats file of its
//! bucket. Concurrent profile units share one log, so appends are serialized.

use crate::model::{Profile, StorageLayout};
use std::io;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends stats lines under a storage layout
#[derive(Debug)]
pub struct StatsLog {
    layout: StorageLayout,
    lock: Mutex<()>,
}

impl StatsLog {
    pub fn new(layout: StorageLayout) -> Self {
        Self {
            layout,
            lock: Mutex::new(()),
        }
    }

    /// Appends the profile's stats line to its bucket log
    ///
    /// # Returns
    ///
    /// The path of the log that was written
    pub async fn append(&self, site_dir: &str, profile: &Profile) -> io::Result<PathBuf> {
        let path = self.layout.stats_path(site_dir, profile.id);
        let line = format!("{}\n", profile.stats_line());

        let _guard = self.lock.lock().await;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!("Appended stats for {} to {}", profile.id, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn profile(id: u64, images: usize) -> Profile {
        Profile::new(id, Vec::new(), vec!["x.jpg".to_string(); images])
    }

    #[tokio::test]
    async fn test_append_creates_bucket_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = StatsLog::new(StorageLayout::new(dir.path()));

        let path = log.append("Baihe", &profile(1234, 3)).await.unwrap();
        log.append("Baihe", &profile(1999, 0)).await.unwrap();

        assert_eq!(path, dir.path().join("Baihe/stats/1.stats"));
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "1234\t3\n1999\t0\n");
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_lines_whole() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(StatsLog::new(StorageLayout::new(dir.path())));

        let mut handles = Vec::new();
        for id in 0..50u64 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.append("Jiayuan", &profile(id, 2)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let content = std::fs::read_to_string(dir.path().join("Jiayuan/stats/0.stats")).unwrap();
        let mut ids: Vec<u64> = content
            .lines()
            .map(|line| {
                let (id, count) = line.split_once('\t').unwrap();
                assert_eq!(count, "2");
                id.parse().unwrap()
            })
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..50).collect::<Vec<_>>());
    }
}
