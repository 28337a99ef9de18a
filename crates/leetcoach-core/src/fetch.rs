//! HTTP page source

use crate::bus::{Endpoint, PageAgent, TabHost, TabInfo};
use crate::extract::NetworkExtractor;
use crate::page::{PageSnapshot, PageSource};
use crate::scrape::ScrapeConfig;
use crate::{FetchConfig, LeetcoachError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP client for problem pages and the site API
pub fn build_client(config: &FetchConfig) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .cookie_store(true)
        .build()?)
}

/// Reads a problem page over plain HTTP (no JavaScript)
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: Client,
    url: Url,
}

impl HttpPageSource {
    /// Create a source with default configuration
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, &FetchConfig::default())
    }

    /// Create a source with custom configuration
    pub fn with_config(url: &str, config: &FetchConfig) -> Result<Self> {
        let url = Url::parse(url)?;
        let client = build_client(config)?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Same client, another page
    pub fn at(&self, url: Url) -> Self {
        Self {
            client: self.client.clone(),
            url,
        }
    }

    /// The underlying client, shared with the site API extractor
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn snapshot(&self) -> Result<PageSnapshot> {
        debug!("Fetching with HTTP: {}", self.url);
        let response = self.client.get(self.url.as_str()).send().await?;
        let url = response.url().clone();
        let html = response.text().await?;
        Ok(PageSnapshot::new(url, html))
    }
}

/// Tab host for a page read over HTTP
pub struct HttpHost {
    source: Mutex<Arc<HttpPageSource>>,
    config: ScrapeConfig,
    use_network: bool,
}

impl HttpHost {
    pub fn new(source: HttpPageSource, config: ScrapeConfig, use_network: bool) -> Self {
        Self {
            source: Mutex::new(Arc::new(source)),
            config,
            use_network,
        }
    }

    fn current(&self) -> Result<Arc<HttpPageSource>> {
        self.source
            .lock()
            .map(|source| Arc::clone(&*source))
            .map_err(|_| LeetcoachError::Messaging("page state poisoned".to_string()))
    }
}

#[async_trait]
impl TabHost for HttpHost {
    async fn active_tab(&self) -> Result<TabInfo> {
        Ok(TabInfo {
            id: 1,
            url: self.current()?.url().clone(),
        })
    }

    async fn navigate(&self, url: &Url) -> Result<()> {
        let next = Arc::new(self.current()?.at(url.clone()));
        let mut source = self
            .source
            .lock()
            .map_err(|_| LeetcoachError::Messaging("page state poisoned".to_string()))?;
        *source = next;
        Ok(())
    }

    async fn inject(&self, _tab: &TabInfo) -> Result<Endpoint> {
        let source = self.current()?;
        let mut agent = PageAgent::new(source.clone(), self.config.clone());
        if self.use_network {
            agent = agent.with_network(NetworkExtractor::new(source.client().clone()));
        }
        Ok(agent.spawn())
    }
}
