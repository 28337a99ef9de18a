//! Page-context view used by the extractors

use crate::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

/// Id of the script element carrying the page's pre-rendered application state
pub const EMBEDDED_DATA_ID: &str = "__NEXT_DATA__";

/// What the page looks like at one instant
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    /// The URL currently shown in the tab
    pub url: Url,
    /// The rendered HTML of the whole document
    pub html: String,
    /// Whether the document has finished loading
    pub ready: bool,
}

impl PageSnapshot {
    pub fn new(url: Url, html: impl Into<String>) -> Self {
        Self {
            url,
            html: html.into(),
            ready: true,
        }
    }

    /// Slug of the problem the tab is on, empty when not on a problem page
    pub fn slug(&self) -> String {
        slug_from_url(&self.url).unwrap_or_default()
    }

    /// Parse the embedded structured-data blob, if the page carries one
    pub fn embedded_data(&self) -> Option<Value> {
        let document = Html::parse_document(&self.html);
        let selector = Selector::parse(&format!("script#{}", EMBEDDED_DATA_ID)).ok()?;
        let script = document.select(&selector).next()?;
        let raw = script.text().collect::<String>();
        serde_json::from_str(raw.trim()).ok()
    }
}

/// Source of fresh page snapshots.
///
/// The orchestrator asks for a new snapshot on every attempt, so
/// implementations must reflect the page as it is now.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn snapshot(&self) -> Result<PageSnapshot>;
}

/// Slug from a `/problems/<slug>/...` path
pub fn slug_from_url(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    segments.find(|segment| *segment == "problems")?;
    segments
        .next()
        .filter(|slug| !slug.is_empty())
        .map(|slug| slug.to_lowercase())
}

/// Whether the URL points at a problem page
pub fn is_problem_url(url: &Url) -> bool {
    slug_from_url(url).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_from_url() {
        let url = Url::parse("https://leetcode.com/problems/two-sum/description/").unwrap();
        assert_eq!(slug_from_url(&url), Some("two-sum".to_string()));

        let bare = Url::parse("https://leetcode.com/problems/lru-cache").unwrap();
        assert_eq!(slug_from_url(&bare), Some("lru-cache".to_string()));
    }

    #[test]
    fn test_slug_from_non_problem_url() {
        let url = Url::parse("https://leetcode.com/problemset/all/").unwrap();
        assert_eq!(slug_from_url(&url), None);
        let trailing = Url::parse("https://leetcode.com/problems/").unwrap();
        assert!(!is_problem_url(&trailing));
    }

    #[test]
    fn test_embedded_data() {
        let html = r#"<html><body><script id="__NEXT_DATA__" type="application/json">
            {"props": {"pageProps": {"ok": true}}}
        </script></body></html>"#;
        let snapshot = PageSnapshot::new(Url::parse("https://leetcode.com/problems/x/").unwrap(), html);
        let data = snapshot.embedded_data().unwrap();
        assert_eq!(data["props"]["pageProps"]["ok"], Value::Bool(true));
        assert_eq!(snapshot.slug(), "x");
    }

    #[test]
    fn test_embedded_data_missing() {
        let snapshot = PageSnapshot::new(Url::parse("https://leetcode.com/").unwrap(), "<p>hi</p>");
        assert!(snapshot.embedded_data().is_none());
        assert_eq!(snapshot.slug(), "");
    }
}
