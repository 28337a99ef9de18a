//! Problem extraction strategies
//!
//! Each strategy maps a page snapshot to an optional draft. They share no
//! state and are tried in a fixed priority order by the orchestrator.

pub mod dom;
pub mod network;
pub mod structured;

use crate::page::PageSnapshot;
use crate::ProblemDraft;
pub use network::NetworkExtractor;

/// One way of reading a problem off a page
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Embedded application state (`__NEXT_DATA__`)
    StructuredData,
    /// Visible page elements
    Dom,
    /// The site's GraphQL API
    Network(NetworkExtractor),
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::StructuredData => "structured-data",
            Strategy::Dom => "dom",
            Strategy::Network(_) => "network",
        }
    }

    pub async fn extract(&self, snapshot: &PageSnapshot) -> Option<ProblemDraft> {
        match self {
            Strategy::StructuredData => {
                let data = snapshot.embedded_data()?;
                structured::extract_structured(&data, &snapshot.url, &snapshot.slug())
            }
            Strategy::Dom => dom::extract_dom(snapshot),
            Strategy::Network(extractor) => extractor.extract(snapshot).await,
        }
    }
}

/// Structured data, then DOM, then (optionally) the network
pub fn default_chain(network: Option<NetworkExtractor>) -> Vec<Strategy> {
    let mut chain = vec![Strategy::StructuredData, Strategy::Dom];
    if let Some(extractor) = network {
        chain.push(Strategy::Network(extractor));
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[tokio::test]
    async fn test_structured_strategy_reads_embedded_blob() {
        let html = r#"<html><body><script id="__NEXT_DATA__" type="application/json">
            {"props": {"question": {"title": "Two Sum", "titleSlug": "two-sum",
             "content": "<p>Find.</p>", "difficulty": "Easy"}}}
        </script></body></html>"#;
        let snapshot = PageSnapshot::new(
            Url::parse("https://leetcode.com/problems/two-sum/").unwrap(),
            html,
        );

        let draft = Strategy::StructuredData.extract(&snapshot).await.unwrap();
        assert_eq!(draft.title, "Two Sum");
        assert!(Strategy::Dom.extract(&snapshot).await.is_none());
    }

    #[test]
    fn test_dom_strategy_on_rendered_page() {
        let html = r#"<html><body>
            <div class="text-title-large">1. Two Sum</div>
            <div data-track-load="description_content"><p>Find.</p></div>
        </body></html>"#;
        let snapshot = PageSnapshot::new(
            Url::parse("https://leetcode.com/problems/two-sum/").unwrap(),
            html,
        );

        assert!(tokio_test::block_on(Strategy::StructuredData.extract(&snapshot)).is_none());
        let draft = tokio_test::block_on(Strategy::Dom.extract(&snapshot)).unwrap();
        assert_eq!(draft.problem_number, "1");
        assert_eq!(draft.slug, "two-sum");
    }

    #[test]
    fn test_default_chain_order() {
        let names: Vec<_> = default_chain(None).iter().map(Strategy::name).collect();
        assert_eq!(names, vec!["structured-data", "dom"]);

        let with_network = default_chain(Some(NetworkExtractor::new(reqwest::Client::new())));
        assert_eq!(with_network.last().map(Strategy::name), Some("network"));
    }
}
