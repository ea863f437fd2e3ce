/// The result of crawling one ID
///
/// Lives only while its ID is processed; what survives is the files on disk
/// and one stats line.
#[derive(Debug, Clone)]
pub struct Profile {
    pub id: u64,

    /// Raw page bytes as fetched
    pub raw: Vec<u8>,

    /// Image URLs in document order
    pub image_urls: Vec<String>,
}

impl Profile {
    pub fn new(id: u64, raw: Vec<u8>, image_urls: Vec<String>) -> Self {
        Self {
            id,
            raw,
            image_urls,
        }
    }

    /// Formats the tab-separated stats line (`id<TAB>imageCount`)
    pub fn stats_line(&self) -> String {
        format!("{}\t{}", self.id, self.image_urls.len())
    }
}
