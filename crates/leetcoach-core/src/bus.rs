//! Request/response messaging between execution contexts
//!
//! Three contexts talk over this bus: the UI (panel or popup), the
//! background process, and the agent injected into a page. Only the
//! background can inject into a page, and only the page agent can read the
//! page, so a UI request for the active problem travels UI -> background ->
//! page and back.
//!
//! Every request carries a generated correlation id and a [`Responder`]
//! that must be answered exactly once. `respond` consumes the responder; a
//! responder dropped unanswered replies with an error instead, so a caller
//! can never hang on a forgotten request.

use crate::extract::{default_chain, NetworkExtractor};
use crate::page::{slug_from_url, PageSource};
use crate::scrape::{ScrapeConfig, Scraper};
use crate::{LeetcoachError, Problem, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use url::Url;

pub type CorrelationId = u64;

/// Identifier of a browser tab
pub type TabId = u32;

/// Message kinds sent on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    /// UI -> background -> page: scrape the problem in the active tab
    GetActiveProblem,
    /// UI -> background: open the panel for the active tab
    OpenSidePanel,
    /// Background -> page: run the scrape orchestrator
    ScrapeProblem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "lowercase")]
pub enum Reply {
    Problem(Problem),
    Ok,
    Error(String),
}

/// Broadcast from the background to every UI surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    /// The tab navigated to a different problem; re-fetch it
    ActiveProblemChanged,
}

/// One-shot reply slot for a request
#[derive(Debug)]
pub struct Responder {
    id: CorrelationId,
    tx: Option<oneshot::Sender<Reply>>,
}

impl Responder {
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    pub fn respond(mut self, reply: Reply) {
        if let Some(tx) = self.tx.take() {
            if tx.send(reply).is_err() {
                debug!("Request {} was abandoned before its reply", self.id);
            }
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!("Request {} dropped without a reply", self.id);
            let _ = tx.send(Reply::Error("handler finished without responding".to_string()));
        }
    }
}

/// A request in flight
#[derive(Debug)]
pub struct Envelope {
    pub request: Request,
    pub responder: Responder,
}

/// Sending half of a context's inbox
#[derive(Debug, Clone)]
pub struct Endpoint {
    name: &'static str,
    tx: mpsc::Sender<Envelope>,
    next_id: Arc<AtomicU64>,
    timeout: Duration,
}

/// Receiving half of a context's inbox
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::Receiver<Envelope>,
}

impl Inbox {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

/// Create an inbox for a context
pub fn channel(name: &'static str) -> (Endpoint, Inbox) {
    let (tx, rx) = mpsc::channel(32);
    let endpoint = Endpoint {
        name,
        tx,
        next_id: Arc::new(AtomicU64::new(1)),
        timeout: Duration::from_secs(30),
    };
    (endpoint, Inbox { rx })
}

impl Endpoint {
    /// How long a request may stay unanswered
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a request and wait for its reply.
    ///
    /// Transport failures come back as `Err(Messaging)`, never as a panic.
    pub async fn send(&self, request: Request) -> Result<Reply> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let envelope = Envelope {
            request,
            responder: Responder { id, tx: Some(tx) },
        };
        debug!("[{}] -> {} {:?}", id, self.name, request);

        self.tx.send(envelope).await.map_err(|_| {
            LeetcoachError::Messaging(format!("could not establish connection: no receiving end in {}", self.name))
        })?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(LeetcoachError::Messaging(format!(
                "{} closed before replying to request {}",
                self.name, id
            ))),
            Err(_) => Err(LeetcoachError::Messaging(format!(
                "{} did not reply to request {} within {:?}",
                self.name, id, self.timeout
            ))),
        }
    }

    /// Ask for the active problem
    pub async fn get_active_problem(&self) -> Result<Problem> {
        match self.send(Request::GetActiveProblem).await? {
            Reply::Problem(problem) => Ok(problem),
            Reply::Error(message) => Err(LeetcoachError::Messaging(message)),
            Reply::Ok => Err(LeetcoachError::Messaging("unexpected empty reply".to_string())),
        }
    }

    /// Ask the background to open the panel for the active tab
    pub async fn open_side_panel(&self) -> Result<()> {
        match self.send(Request::OpenSidePanel).await? {
            Reply::Ok => Ok(()),
            Reply::Error(message) => Err(LeetcoachError::Messaging(message)),
            Reply::Problem(_) => Err(LeetcoachError::Messaging("unexpected reply".to_string())),
        }
    }
}

/// The agent injected into one page: answers `SCRAPE_PROBLEM`
pub struct PageAgent {
    source: Arc<dyn PageSource>,
    config: ScrapeConfig,
    network: Option<NetworkExtractor>,
}

impl PageAgent {
    pub fn new(source: Arc<dyn PageSource>, config: ScrapeConfig) -> Self {
        Self {
            source,
            config,
            network: None,
        }
    }

    pub fn with_network(mut self, network: NetworkExtractor) -> Self {
        self.network = Some(network);
        self
    }

    /// Start serving on a new inbox and return its endpoint
    pub fn spawn(self) -> Endpoint {
        let (endpoint, inbox) = channel("page");
        let timeout = self.config.timeout + Duration::from_secs(5);
        tokio::spawn(self.serve(inbox));
        endpoint.with_timeout(timeout)
    }

    async fn serve(self, mut inbox: Inbox) {
        let agent = Arc::new(self);
        while let Some(envelope) = inbox.recv().await {
            match envelope.request {
                Request::ScrapeProblem => {
                    let agent = Arc::clone(&agent);
                    tokio::spawn(async move {
                        let reply = agent.scrape().await;
                        envelope.responder.respond(reply);
                    });
                }
                other => envelope
                    .responder
                    .respond(Reply::Error(format!("{:?} is not handled in the page", other))),
            }
        }
        debug!("Page agent inbox closed");
    }

    async fn scrape(&self) -> Reply {
        let chain = default_chain(self.network.clone());
        let mut scraper = Scraper::with_chain(self.config.clone(), chain);
        match scraper.scrape(self.source.as_ref()).await {
            Ok(problem) => Reply::Problem(problem),
            Err(e) => Reply::Error(e.to_string()),
        }
    }
}

/// A tab as seen by the background
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub url: Url,
}

/// Browser facilities only the background may use
#[async_trait]
pub trait TabHost: Send + Sync {
    /// The tab the user is looking at
    async fn active_tab(&self) -> Result<TabInfo>;

    /// Point the active tab at another page
    async fn navigate(&self, url: &Url) -> Result<()>;

    /// Inject a page agent into `tab` and return its endpoint
    async fn inject(&self, tab: &TabInfo) -> Result<Endpoint>;
}

/// Detects navigation to a different problem.
///
/// Owns the "last seen problem" state so it can be tested without a browser.
#[derive(Debug, Default)]
pub struct NavigationTracker {
    last_slug: Option<String>,
}

impl NavigationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a URL change; true when it lands on a new problem
    pub fn observe(&mut self, url: &Url) -> bool {
        match slug_from_url(url) {
            Some(slug) if self.last_slug.as_deref() == Some(slug.as_str()) => false,
            Some(slug) => {
                self.last_slug = Some(slug);
                true
            }
            None => {
                self.last_slug = None;
                false
            }
        }
    }
}

struct BackgroundState {
    tracker: NavigationTracker,
    panels: HashSet<TabId>,
}

/// The persistent background process
#[derive(Clone)]
pub struct Background {
    host: Arc<dyn TabHost>,
    state: Arc<Mutex<BackgroundState>>,
    notifications: broadcast::Sender<Notification>,
}

impl Background {
    pub fn new(host: Arc<dyn TabHost>) -> Self {
        let (notifications, _) = broadcast::channel(16);
        Self {
            host,
            state: Arc::new(Mutex::new(BackgroundState {
                tracker: NavigationTracker::new(),
                panels: HashSet::new(),
            })),
            notifications,
        }
    }

    /// Start serving requests and return the endpoint UI surfaces talk to
    pub fn spawn(&self) -> Endpoint {
        let (endpoint, inbox) = channel("background");
        tokio::spawn(self.clone().serve(inbox));
        endpoint
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Whether a panel has been opened for `tab`
    pub fn panel_open(&self, tab: TabId) -> bool {
        self.state
            .lock()
            .map(|state| state.panels.contains(&tab))
            .unwrap_or(false)
    }

    /// Navigate the active tab and report the URL change
    pub async fn navigate(&self, url: &Url) -> Result<()> {
        self.host.navigate(url).await?;
        self.on_navigation(url);
        Ok(())
    }

    /// Called on every URL change of a tab
    pub fn on_navigation(&self, url: &Url) {
        let changed = match self.state.lock() {
            Ok(mut state) => state.tracker.observe(url),
            Err(_) => false,
        };
        if changed {
            info!("Active problem changed: {}", url);
            // No subscribers is fine; nobody needs to re-fetch
            let _ = self.notifications.send(Notification::ActiveProblemChanged);
        }
    }

    async fn serve(self, mut inbox: Inbox) {
        while let Some(envelope) = inbox.recv().await {
            let background = self.clone();
            tokio::spawn(async move {
                let Envelope { request, responder } = envelope;
                debug!("[{}] background handling {:?}", responder.id(), request);
                let reply = match background.handle(request).await {
                    Ok(reply) => reply,
                    Err(e) => Reply::Error(e.to_string()),
                };
                responder.respond(reply);
            });
        }
        debug!("Background inbox closed");
    }

    async fn handle(&self, request: Request) -> Result<Reply> {
        match request {
            Request::GetActiveProblem => {
                let tab = self.host.active_tab().await?;
                let page = self.host.inject(&tab).await?;
                page.send(Request::ScrapeProblem).await
            }
            Request::OpenSidePanel => {
                let tab = self.host.active_tab().await?;
                self.state
                    .lock()
                    .map_err(|_| LeetcoachError::Messaging("background state poisoned".to_string()))?
                    .panels
                    .insert(tab.id);
                info!("Panel opened for tab {}", tab.id);
                Ok(Reply::Ok)
            }
            Request::ScrapeProblem => Ok(Reply::Error(
                "SCRAPE_PROBLEM must be sent to a page".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageSnapshot;

    const PROBLEM_PAGE: &str = r#"<html><body>
        <div class="text-title-large">1. Two Sum</div>
        <div data-track-load="description_content"><p>Find.</p></div>
    </body></html>"#;

    struct StaticPage {
        url: Url,
        html: &'static str,
    }

    #[async_trait]
    impl PageSource for StaticPage {
        async fn snapshot(&self) -> Result<PageSnapshot> {
            Ok(PageSnapshot::new(self.url.clone(), self.html))
        }
    }

    struct FakeHost {
        tab: Mutex<Option<TabInfo>>,
        html: &'static str,
    }

    impl FakeHost {
        fn on(url: &str, html: &'static str) -> Self {
            Self {
                tab: Mutex::new(Some(TabInfo {
                    id: 7,
                    url: Url::parse(url).unwrap(),
                })),
                html,
            }
        }
    }

    #[async_trait]
    impl TabHost for FakeHost {
        async fn active_tab(&self) -> Result<TabInfo> {
            self.tab
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| LeetcoachError::Messaging("no active tab".to_string()))
        }

        async fn navigate(&self, url: &Url) -> Result<()> {
            let mut tab = self.tab.lock().unwrap();
            match tab.as_mut() {
                Some(tab) => {
                    tab.url = url.clone();
                    Ok(())
                }
                None => Err(LeetcoachError::Messaging("no active tab".to_string())),
            }
        }

        async fn inject(&self, tab: &TabInfo) -> Result<Endpoint> {
            let page = StaticPage {
                url: tab.url.clone(),
                html: self.html,
            };
            let config = ScrapeConfig {
                poll_interval: Duration::from_millis(100),
                timeout: Duration::from_secs(1),
            };
            Ok(PageAgent::new(Arc::new(page), config).spawn())
        }
    }

    #[tokio::test]
    async fn test_get_active_problem_round_trip() {
        let host = FakeHost::on("https://leetcode.com/problems/two-sum/", PROBLEM_PAGE);
        let background = Background::new(Arc::new(host));
        let ui = background.spawn();

        let problem = ui.get_active_problem().await.unwrap();
        assert_eq!(problem.title, "Two Sum");
        assert_eq!(problem.slug, "two-sum");
    }

    #[tokio::test(start_paused = true)]
    async fn test_scrape_timeout_becomes_error_value() {
        let host = FakeHost::on("https://leetcode.com/problems/two-sum/", "<html></html>");
        let background = Background::new(Arc::new(host));
        let ui = background.spawn();

        let err = ui.get_active_problem().await.unwrap_err();
        assert!(err.to_string().contains("could not detect a problem"));
    }

    #[tokio::test]
    async fn test_open_side_panel() {
        let host = FakeHost::on("https://leetcode.com/problems/two-sum/", PROBLEM_PAGE);
        let background = Background::new(Arc::new(host));
        let ui = background.spawn();

        assert!(!background.panel_open(7));
        ui.open_side_panel().await.unwrap();
        assert!(background.panel_open(7));
    }

    #[tokio::test]
    async fn test_missing_tab_is_error_value() {
        let host = FakeHost {
            tab: Mutex::new(None),
            html: "",
        };
        let background = Background::new(Arc::new(host));
        let ui = background.spawn();

        let err = ui.open_side_panel().await.unwrap_err();
        assert!(matches!(err, LeetcoachError::Messaging(ref m) if m.contains("no active tab")));
    }

    #[tokio::test]
    async fn test_no_receiving_end() {
        let (endpoint, inbox) = channel("page");
        drop(inbox);
        let err = endpoint.send(Request::ScrapeProblem).await.unwrap_err();
        assert!(err.to_string().contains("no receiving end"));
    }

    #[tokio::test]
    async fn test_dropped_responder_still_replies() {
        let (endpoint, mut inbox) = channel("page");
        tokio::spawn(async move {
            // Handler forgets to answer
            let _envelope = inbox.recv().await;
        });

        let reply = endpoint.send(Request::ScrapeProblem).await.unwrap();
        assert!(matches!(reply, Reply::Error(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_request_times_out() {
        let (endpoint, mut inbox) = channel("page");
        let endpoint = endpoint.with_timeout(Duration::from_secs(2));
        let handle = tokio::spawn(async move {
            let envelope = inbox.recv().await;
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(envelope);
        });

        let err = endpoint.send(Request::ScrapeProblem).await.unwrap_err();
        assert!(err.to_string().contains("did not reply"));
        handle.abort();
    }

    #[tokio::test]
    async fn test_page_rejects_background_requests() {
        let page = StaticPage {
            url: Url::parse("https://leetcode.com/problems/two-sum/").unwrap(),
            html: PROBLEM_PAGE,
        };
        let endpoint = PageAgent::new(Arc::new(page), ScrapeConfig::default()).spawn();
        let reply = endpoint.send(Request::OpenSidePanel).await.unwrap();
        assert!(matches!(reply, Reply::Error(_)));
    }

    #[test]
    fn test_navigation_tracker() {
        let mut tracker = NavigationTracker::new();
        let two_sum = Url::parse("https://leetcode.com/problems/two-sum/").unwrap();
        let two_sum_tab = Url::parse("https://leetcode.com/problems/two-sum/solutions/").unwrap();
        let three_sum = Url::parse("https://leetcode.com/problems/3sum/").unwrap();
        let list = Url::parse("https://leetcode.com/problemset/").unwrap();

        assert!(tracker.observe(&two_sum));
        assert!(!tracker.observe(&two_sum_tab));
        assert!(tracker.observe(&three_sum));
        assert!(!tracker.observe(&list));
        assert!(tracker.observe(&three_sum));
    }

    #[tokio::test]
    async fn test_navigation_broadcasts_change() {
        let host = FakeHost::on("https://leetcode.com/problems/two-sum/", PROBLEM_PAGE);
        let background = Background::new(Arc::new(host));
        let mut changes = background.subscribe();

        background.on_navigation(&Url::parse("https://leetcode.com/problems/two-sum/").unwrap());
        background.on_navigation(&Url::parse("https://leetcode.com/problems/two-sum/editorial/").unwrap());

        assert_eq!(changes.recv().await.unwrap(), Notification::ActiveProblemChanged);
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_navigate_announces_new_problem() {
        let host = FakeHost::on("https://leetcode.com/problems/two-sum/", PROBLEM_PAGE);
        let background = Background::new(Arc::new(host));
        let ui = background.spawn();
        let mut changes = background.subscribe();

        let next = Url::parse("https://leetcode.com/problems/3sum/").unwrap();
        background.navigate(&next).await.unwrap();
        assert_eq!(changes.recv().await.unwrap(), Notification::ActiveProblemChanged);

        let problem = ui.get_active_problem().await.unwrap();
        assert_eq!(problem.slug, "3sum");
    }

    #[test]
    fn test_wire_names() {
        let request = serde_json::to_value(Request::GetActiveProblem).unwrap();
        assert_eq!(request["type"], "GET_ACTIVE_PROBLEM");
        let note = serde_json::to_value(Notification::ActiveProblemChanged).unwrap();
        assert_eq!(note["type"], "ACTIVE_PROBLEM_CHANGED");
    }
}
