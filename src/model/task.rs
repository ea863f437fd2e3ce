use serde::{Deserialize, Serialize};
use std::fmt;

/// Sites the crawler knows how to address
///
/// The set is closed; which of them can actually be crawled is decided by
/// the site registry built at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Jiayuan,
    Baihe,
    Renren,
}

impl Site {
    /// The tag used for this site in task and config files
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Jiayuan => "jiayuan",
            Self::Baihe => "baihe",
            Self::Renren => "renren",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A half-open ID interval `[begin_id, end_id)`
///
/// `begin_id` is the task's checkpoint and is the only field rewritten while
/// crawling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IdRange {
    pub begin_id: u64,
    pub end_id: u64,
}

impl IdRange {
    pub fn new(begin_id: u64, end_id: u64) -> Self {
        Self { begin_id, end_id }
    }

    pub fn is_empty(&self) -> bool {
        self.end_id <= self.begin_id
    }

    pub fn len(&self) -> u64 {
        self.end_id.saturating_sub(self.begin_id)
    }
}

/// One site's crawl job
///
/// Serialized as `{"type": "<site>", "data": {...}}`; the payload shape is
/// chosen by the tag. All sites share the ID-range shape today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Task {
    Jiayuan(IdRange),
    Baihe(IdRange),
    Renren(IdRange),
}

impl Task {
    /// Creates a task for the given site and range
    pub fn new(site: Site, range: IdRange) -> Self {
        match site {
            Site::Jiayuan => Self::Jiayuan(range),
            Site::Baihe => Self::Baihe(range),
            Site::Renren => Self::Renren(range),
        }
    }

    pub fn site(&self) -> Site {
        match self {
            Self::Jiayuan(_) => Site::Jiayuan,
            Self::Baihe(_) => Site::Baihe,
            Self::Renren(_) => Site::Renren,
        }
    }

    pub fn range(&self) -> &IdRange {
        match self {
            Self::Jiayuan(range) | Self::Baihe(range) | Self::Renren(range) => range,
        }
    }

    pub fn range_mut(&mut self) -> &mut IdRange {
        match self {
            Self::Jiayuan(range) | Self::Baihe(range) | Self::Renren(range) => range,
        }
    }
}
