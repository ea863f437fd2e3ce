//! Site registry
//!
//! Maps each crawlable site to its profile URL template, its directory name,
//! and its extraction strategy. Built once at startup and handed to the
//! coordinator; a site without an entry cannot be crawled.

use crate::config::{validate_url_template, Config, SiteOverride};
use crate::crawler::extract::{BaiheExtractor, ImageExtractor, JiayuanExtractor};
use crate::model::Site;
use crate::{ConfigError, HarvestError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Everything the crawler needs to know about one site
#[derive(Clone)]
pub struct SiteEntry {
    pub site: Site,

    /// Profile URL template; `{id}` is replaced by the profile ID
    pub url_template: String,

    /// Directory name under the data and archive folders
    pub directory: String,

    pub extractor: Arc<dyn ImageExtractor>,
}

impl SiteEntry {
    pub fn new(
        site: Site,
        url_template: impl Into<String>,
        directory: impl Into<String>,
        extractor: Arc<dyn ImageExtractor>,
    ) -> Self {
        Self {
            site,
            url_template: url_template.into(),
            directory: directory.into(),
            extractor,
        }
    }

    /// Profile page URL for an ID
    pub fn profile_url(&self, id: u64) -> String {
        self.url_template.replace("{id}", &id.to_string())
    }
}

impl fmt::Debug for SiteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteEntry")
            .field("site", &self.site)
            .field("url_template", &self.url_template)
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

/// Lookup table from site to [`SiteEntry`]
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    entries: HashMap<Site, SiteEntry>,
}

impl SiteRegistry {
    /// A registry with no sites
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in sites: Jiayuan and Baihe
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(SiteEntry::new(
            Site::Jiayuan,
            "http://www.jiayuan.com/{id}",
            "Jiayuan",
            Arc::new(JiayuanExtractor),
        ));
        registry.register(SiteEntry::new(
            Site::Baihe,
            "http://profile1.baihe.com/?oppId={id}",
            "Baihe",
            Arc::new(BaiheExtractor),
        ));
        registry
    }

    /// The built-in sites with the config's overrides applied
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        let mut registry = Self::builtin();
        registry.apply_overrides(&config.sites)?;
        Ok(registry)
    }

    /// Adds or replaces a site
    pub fn register(&mut self, entry: SiteEntry) {
        self.entries.insert(entry.site, entry);
    }

    /// Applies URL template and directory overrides to registered sites
    ///
    /// Overriding a site that has no entry is an error.
    pub fn apply_overrides(
        &mut self,
        overrides: &HashMap<Site, SiteOverride>,
    ) -> Result<(), HarvestError> {
        for (site, entry_override) in overrides {
            let entry = self
                .entries
                .get_mut(site)
                .ok_or(HarvestError::UnknownSite(*site))?;

            if let Some(template) = &entry_override.profile_url {
                validate_url_template(template).map_err(ConfigError::InvalidUrl)?;
                entry.url_template = template.clone();
            }
            if let Some(directory) = &entry_override.directory {
                entry.directory = directory.clone();
            }
        }
        Ok(())
    }

    /// Looks up a site, failing loudly if it has no entry
    pub fn get(&self, site: Site) -> Result<&SiteEntry, HarvestError> {
        self.entries.get(&site).ok_or(HarvestError::UnknownSite(site))
    }
}
