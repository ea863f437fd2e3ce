//! Processing of a single profile ID
//!
//! Fetch the page, extract image URLs, and when enough images were found,
//! download them, save the page, and append a stats line. Failures are
//! logged and end the unit; none of them stop the crawl.

use crate::crawler::extract::parse_document;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::gate::AdmissionGate;
use crate::crawler::registry::SiteEntry;
use crate::model::layout::image_file_name;
use crate::model::{Profile, StorageLayout};
use crate::storage::StatsLog;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use url::Url;

/// What happened to one ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileOutcome {
    /// Page, stats line, and `images - failed_images` images written
    Saved { images: usize, failed_images: usize },

    /// Fewer images than the threshold; nothing written
    Rejected { found: usize },

    /// The page could not be fetched or saved
    Skipped { reason: String },
}

/// Runs the fetch, extract, and save steps for profile IDs
#[derive(Debug)]
pub struct ProfileProcessor {
    fetcher: Arc<Fetcher>,
    layout: StorageLayout,
    stats: Arc<StatsLog>,
    valid_image_count: usize,
    image_concurrency: usize,
}

impl ProfileProcessor {
    /// Creates a processor
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Shared fetcher for pages and images
    /// * `layout` - Where profiles are written
    /// * `stats` - Shared stats log
    /// * `valid_image_count` - Profiles with fewer images are discarded
    /// * `image_concurrency` - Concurrent image downloads per profile
    pub fn new(
        fetcher: Arc<Fetcher>,
        layout: StorageLayout,
        stats: Arc<StatsLog>,
        valid_image_count: usize,
        image_concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            layout,
            stats,
            valid_image_count,
            image_concurrency: image_concurrency.max(1),
        }
    }

    /// Processes one profile ID end to end
    pub async fn process(&self, site: &SiteEntry, id: u64) -> ProfileOutcome {
        let url = site.profile_url(id);
        tracing::debug!("Crawling {} id {}", site.site, id);

        let response = match self.fetcher.fetch(&url).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Skipping {} id {}: {}", site.site, id, e);
                return ProfileOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        };

        let profile = parse_profile(site, id, response.body);
        let found = profile.image_urls.len();

        if found < self.valid_image_count {
            tracing::debug!(
                "Discarding {} id {}: {} images (need {})",
                site.site,
                id,
                found,
                self.valid_image_count
            );
            return ProfileOutcome::Rejected { found };
        }

        match self.save(site, &url, &profile).await {
            Ok(failed_images) => ProfileOutcome::Saved {
                images: found,
                failed_images,
            },
            Err(e) => {
                tracing::warn!("Failed to save {} id {}: {}", site.site, id, e);
                ProfileOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Writes images, then the page, then the stats line
    ///
    /// # Returns
    ///
    /// The number of images that could not be downloaded
    async fn save(
        &self,
        site: &SiteEntry,
        page_url: &str,
        profile: &Profile,
    ) -> std::io::Result<usize> {
        let dir = self.layout.profile_dir(&site.directory, profile.id);
        tokio::fs::create_dir_all(&dir).await?;

        let failed_images = self.download_images(site, page_url, profile).await;

        let page_path = self.layout.page_path(&site.directory, profile.id);
        tokio::fs::write(&page_path, &profile.raw).await?;
        tracing::debug!(
            "Saved {} bytes of page data to {}",
            profile.raw.len(),
            page_path.display()
        );

        self.stats.append(&site.directory, profile).await?;

        Ok(failed_images)
    }

    /// Downloads every image concurrently and waits for all of them
    async fn download_images(&self, site: &SiteEntry, page_url: &str, profile: &Profile) -> usize {
        let base = Url::parse(page_url).ok();
        let gate = AdmissionGate::new(self.image_concurrency);
        let mut downloads = JoinSet::new();
        let mut failed = 0;

        for image_url in &profile.image_urls {
            let Some(target) = self.image_target(site, profile.id, base.as_ref(), image_url) else {
                tracing::warn!("No usable file name in image URL {}", image_url);
                failed += 1;
                continue;
            };

            let Some(admission) = gate.admit().await else {
                failed += 1;
                continue;
            };

            let fetcher = self.fetcher.clone();
            downloads.spawn(async move {
                let _admission = admission;
                download_image(&fetcher, target).await
            });
        }

        while let Some(result) = downloads.join_next().await {
            if !matches!(result, Ok(true)) {
                failed += 1;
            }
        }

        failed
    }

    /// Resolves an image URL and the path it is saved under
    fn image_target(
        &self,
        site: &SiteEntry,
        id: u64,
        base: Option<&Url>,
        image_url: &str,
    ) -> Option<(Url, PathBuf)> {
        let url = match base {
            Some(base) => base.join(image_url).ok()?,
            None => Url::parse(image_url).ok()?,
        };
        let name = image_file_name(&url)?;
        let path = self.layout.image_path(&site.directory, id, &name);
        Some((url, path))
    }
}

/// Parses a fetched page and runs the site's extraction rules
///
/// The parsed document is dropped before returning; it cannot cross an await.
fn parse_profile(site: &SiteEntry, id: u64, raw: Vec<u8>) -> Profile {
    let image_urls = {
        let document = parse_document(&raw);
        site.extractor.extract(&document)
    };
    Profile::new(id, raw, image_urls)
}

async fn download_image(fetcher: &Fetcher, (url, path): (Url, PathBuf)) -> bool {
    let response = match fetcher.fetch(url.as_str()).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Image download failed: {}", e);
            return false;
        }
    };

    match tokio::fs::write(&path, &response.body).await {
        Ok(()) => {
            tracing::debug!(
                "Downloaded {} bytes from {} -> {}",
                response.body.len(),
                url,
                path.display()
            );
            true
        }
        Err(e) => {
            tracing::warn!("Failed to write {}: {}", path.display(), e);
            false
        }
    }
}
