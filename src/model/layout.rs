//! ID to filesystem path mapping
//!
//! Profiles live three directories deep:
//! `<data>/<site>/<id / 10^6>/<id / 10^3 % 10^3>/<id % 10^3>/`.
//! The archiver rebuilds the directories of an ID range from the same
//! functions, so both sides must go through this module.

use std::path::PathBuf;
use url::Url;

/// Number of consecutive IDs sharing one bucket directory
pub const GROUP_STEP: u64 = 1000;

/// Directory holding the per-bucket stats logs of a site
pub const STATS_DIR: &str = "stats";

/// Relative leaf directory of an ID (`a/b/c`)
pub fn id_path(id: u64) -> PathBuf {
    let mut path = bucket_path(id);
    path.push((id % 1000).to_string());
    path
}

/// Relative bucket directory holding [`GROUP_STEP`] consecutive IDs (`a/b`)
pub fn bucket_path(id: u64) -> PathBuf {
    let mut path = PathBuf::from((id / 1_000_000).to_string());
    path.push((id / 1000 % 1000).to_string());
    path
}

/// Relative directories that together hold exactly the IDs in `[start, end)`
///
/// A bucket that the range covers completely is returned as its bucket
/// directory; every other ID contributes its own leaf directory.
pub fn range_dirs(start: u64, end: u64) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut id = start;

    while id < end {
        if id % GROUP_STEP == 0 && id + GROUP_STEP <= end {
            dirs.push(bucket_path(id));
            id += GROUP_STEP;
        } else {
            dirs.push(id_path(id));
            id += 1;
        }
    }

    dirs
}

/// File name an image is stored under: the last path segment of its URL
///
/// Returns `None` when the URL has no usable file name.
pub fn image_file_name(url: &Url) -> Option<String> {
    let name = url.path_segments()?.last()?;
    if name.is_empty() || name == "." || name == ".." || name.contains('\\') {
        return None;
    }
    Some(name.to_string())
}

/// Resolves the on-disk locations for one data folder
#[derive(Debug, Clone)]
pub struct StorageLayout {
    data_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Base directory of one site (`<data>/<site>`)
    pub fn site_dir(&self, site_dir: &str) -> PathBuf {
        self.data_dir.join(site_dir)
    }

    /// Leaf directory holding one profile's page and images
    pub fn profile_dir(&self, site_dir: &str, id: u64) -> PathBuf {
        self.site_dir(site_dir).join(id_path(id))
    }

    /// Path of the saved profile page (`<leaf>/<id>.html`)
    pub fn page_path(&self, site_dir: &str, id: u64) -> PathBuf {
        self.profile_dir(site_dir, id).join(format!("{}.html", id))
    }

    pub fn image_path(&self, site_dir: &str, id: u64, file_name: &str) -> PathBuf {
        self.profile_dir(site_dir, id).join(file_name)
    }

    /// Stats log shared by the IDs of one bucket (`<site>/stats/<id/1000>.stats`)
    pub fn stats_path(&self, site_dir: &str, id: u64) -> PathBuf {
        self.site_dir(site_dir)
            .join(STATS_DIR)
            .join(format!("{}.stats", id / GROUP_STEP))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_id_path_components() {
        assert_eq!(id_path(0), PathBuf::from("0/0/0"));
        assert_eq!(id_path(109), PathBuf::from("0/0/109"));
        assert_eq!(id_path(123_456_789), PathBuf::from("123/456/789"));
        assert_eq!(bucket_path(123_456_789), PathBuf::from("123/456"));
    }

    #[test]
    fn test_id_path_is_injective() {
        let ids = (0..5_000u64).chain(999_000..1_002_000);
        let mut seen = HashSet::new();
        for id in ids {
            assert!(seen.insert(id_path(id)), "duplicate path for id {}", id);
        }
    }

    #[test]
    fn test_range_dirs_whole_buckets() {
        let dirs = range_dirs(10_000, 20_000);
        assert_eq!(dirs.len(), 10);
        assert_eq!(dirs[0], PathBuf::from("0/10"));
        assert_eq!(dirs[9], PathBuf::from("0/19"));
    }

    #[test]
    fn test_range_dirs_partial_bucket_uses_leaves() {
        let dirs = range_dirs(100, 110);
        assert_eq!(dirs.len(), 10);
        assert_eq!(dirs[0], PathBuf::from("0/0/100"));
        assert_eq!(dirs[9], PathBuf::from("0/0/109"));
    }

    #[test]
    fn test_range_dirs_mixed() {
        let dirs = range_dirs(998, 2_001);
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("0/0/998"),
                PathBuf::from("0/0/999"),
                PathBuf::from("0/1"),
                PathBuf::from("0/2/0"),
            ]
        );
    }

    #[test]
    fn test_range_dirs_empty() {
        assert!(range_dirs(5, 5).is_empty());
    }

    #[test]
    fn test_image_file_name() {
        let url = Url::parse("http://img.example.com/a/b/photo_1.jpg?x=1").unwrap();
        assert_eq!(image_file_name(&url), Some("photo_1.jpg".to_string()));

        let dir = Url::parse("http://img.example.com/a/").unwrap();
        assert_eq!(image_file_name(&dir), None);
    }

    #[test]
    fn test_layout_paths() {
        let layout = StorageLayout::new("/data");
        assert_eq!(
            layout.page_path("Baihe", 1_002_003),
            PathBuf::from("/data/Baihe/1/2/3/1002003.html")
        );
        assert_eq!(
            layout.image_path("Baihe", 7, "x.jpg"),
            PathBuf::from("/data/Baihe/0/0/7/x.jpg")
        );
        assert_eq!(
            layout.stats_path("Baihe", 12_345),
            PathBuf::from("/data/Baihe/stats/12.stats")
        );
    }
}
