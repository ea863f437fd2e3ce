//! Per-site image extraction rules
//!
//! Each strategy is a pure function of a parsed document: the same document
//! always yields the same URLs, in document order.

use scraper::{Html, Selector};

/// Finds the profile image URLs on a parsed page
pub trait ImageExtractor: Send + Sync {
    fn extract(&self, document: &Html) -> Vec<String>;
}

/// Parses raw page bytes into a document
///
/// HTML5 parsing is total; bytes that are not valid UTF-8 are decoded lossily.
pub fn parse_document(raw: &[u8]) -> Html {
    Html::parse_document(&String::from_utf8_lossy(raw))
}

/// Jiayuan profile photos
///
/// `<img class="img_absolute" _src="...">`, minus invitation placeholders and
/// thumbnail variants.
#[derive(Debug, Default, Clone, Copy)]
pub struct JiayuanExtractor;

impl JiayuanExtractor {
    const PLACEHOLDERS: [&'static str; 4] =
        ["photo_invite_", "_bp.jpg", "avatar_p.jpg", "_p.jpg"];
}

impl ImageExtractor for JiayuanExtractor {
    fn extract(&self, document: &Html) -> Vec<String> {
        let Ok(selector) = Selector::parse("img") else {
            return Vec::new();
        };

        document
            .select(&selector)
            .filter(|element| element.value().attr("class") == Some("img_absolute"))
            .filter_map(|element| element.value().attr("_src"))
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .filter(|url| !Self::PLACEHOLDERS.iter().any(|p| url.contains(p)))
            .inspect(|url| tracing::trace!("Found image: {}", url))
            .map(str::to_string)
            .collect()
    }
}

/// Baihe profile photos: `<img src>` pointing at a 290x290 JPEG
#[derive(Debug, Default, Clone, Copy)]
pub struct BaiheExtractor;

impl ImageExtractor for BaiheExtractor {
    fn extract(&self, document: &Html) -> Vec<String> {
        let Ok(selector) = Selector::parse("img[src]") else {
            return Vec::new();
        };

        document
            .select(&selector)
            .filter_map(|element| element.value().attr("src"))
            .map(str::trim)
            .filter(|url| url.contains("/290_290/") && url.contains(".jpg"))
            .inspect(|url| tracing::trace!("Found image: {}", url))
            .map(str::to_string)
            .collect()
    }
}
