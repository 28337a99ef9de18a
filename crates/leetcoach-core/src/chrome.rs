//! Headless Chrome page source
//!
//! Problem pages render most of their content client-side. Loading them in
//! headless Chrome and re-reading the live document on every attempt lets the
//! orchestrator see the page as it fills in.

use crate::bus::{Endpoint, PageAgent, TabHost, TabInfo};
use crate::extract::NetworkExtractor;
use crate::page::{PageSnapshot, PageSource};
use crate::scrape::ScrapeConfig;
use crate::{LeetcoachError, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Configuration for launching Chrome
#[derive(Debug, Clone, Default)]
pub struct ChromeConfig {
    /// Custom Chrome binary path; discovered on the system when unset
    pub chrome_path: Option<PathBuf>,
}

/// Handle to a running browser instance
pub struct BrowserHandle {
    pub browser: Browser,
    handle: tokio::task::JoinHandle<()>,
}

impl BrowserHandle {
    /// Launch Chrome according to `config`
    pub async fn launch(config: &ChromeConfig) -> Result<Self> {
        let chrome_path = config
            .chrome_path
            .clone()
            .filter(|p| p.exists())
            .or_else(find_system_chrome)
            .ok_or_else(|| LeetcoachError::Browser("No system Chrome found".to_string()))?;
        debug!("Launching browser from {:?}", chrome_path);

        let (browser, mut handler) = Browser::launch(
            BrowserConfig::builder()
                .chrome_executable(chrome_path)
                .arg("--disable-gpu")
                .arg("--no-sandbox")
                .arg("--disable-dev-shm-usage")
                .build()
                .map_err(LeetcoachError::Browser)?,
        )
        .await
        .map_err(|e| LeetcoachError::Browser(format!("Failed to launch browser: {}", e)))?;

        let handle = tokio::spawn(async move {
            while handler.next().await.is_some() {}
        });

        Ok(Self { browser, handle })
    }

    /// Open `url` in a new tab without waiting for it to finish rendering
    pub async fn open(&self, url: &str) -> Result<ChromeTab> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| LeetcoachError::Browser(e.to_string()))?;
        Ok(ChromeTab { page })
    }
}

impl Drop for BrowserHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A live browser tab
#[derive(Debug, Clone)]
pub struct ChromeTab {
    page: Page,
}

impl ChromeTab {
    /// Current URL of the tab
    pub async fn current_url(&self) -> Result<Url> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| LeetcoachError::Browser(e.to_string()))?
            .ok_or_else(|| LeetcoachError::Browser("Tab has no URL".to_string()))?;
        Ok(Url::parse(&url)?)
    }

    /// Navigate the tab to another page
    pub async fn navigate(&self, url: &Url) -> Result<()> {
        self.page
            .goto(url.as_str())
            .await
            .map_err(|e| LeetcoachError::Browser(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl PageSource for ChromeTab {
    async fn snapshot(&self) -> Result<PageSnapshot> {
        let url = self.current_url().await?;
        let html = self
            .page
            .content()
            .await
            .map_err(|e| LeetcoachError::Browser(e.to_string()))?;
        let ready = self
            .page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|result| result.into_value::<String>().ok())
            .map(|state| state == "complete")
            .unwrap_or(false);

        debug!("Chrome snapshot of {} ({} bytes, ready: {})", url, html.len(), ready);
        Ok(PageSnapshot { url, html, ready })
    }
}

/// Tab host backed by a single headless Chrome tab
pub struct ChromeHost {
    tab: ChromeTab,
    config: ScrapeConfig,
    network: Option<NetworkExtractor>,
}

impl ChromeHost {
    pub fn new(tab: ChromeTab, config: ScrapeConfig, network: Option<NetworkExtractor>) -> Self {
        Self {
            tab,
            config,
            network,
        }
    }
}

#[async_trait]
impl TabHost for ChromeHost {
    async fn active_tab(&self) -> Result<TabInfo> {
        Ok(TabInfo {
            id: 1,
            url: self.tab.current_url().await?,
        })
    }

    async fn navigate(&self, url: &Url) -> Result<()> {
        self.tab.navigate(url).await
    }

    async fn inject(&self, _tab: &TabInfo) -> Result<Endpoint> {
        let mut agent = PageAgent::new(Arc::new(self.tab.clone()), self.config.clone());
        if let Some(network) = &self.network {
            agent = agent.with_network(network.clone());
        }
        Ok(agent.spawn())
    }
}

/// Find Chrome installed on the system
pub fn find_system_chrome() -> Option<PathBuf> {
    let candidates: Vec<&str> = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        vec![]
    };

    candidates
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
        .or_else(|| {
            which::which("google-chrome")
                .or_else(|_| which::which("chromium"))
                .or_else(|_| which::which("chromium-browser"))
                .ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_system_chrome() {
        // Only checks that discovery doesn't panic on machines without Chrome
        let _result = find_system_chrome();
    }

    #[tokio::test]
    async fn test_launch_with_missing_binary() {
        let config = ChromeConfig {
            chrome_path: Some(PathBuf::from("/nonexistent/chrome")),
        };
        if find_system_chrome().is_none() {
            let err = BrowserHandle::launch(&config).await.err().unwrap();
            assert!(matches!(err, LeetcoachError::Browser(_)));
        }
    }
}
