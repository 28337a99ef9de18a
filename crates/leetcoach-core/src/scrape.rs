//! Bounded-time scrape orchestration
//!
//! Problem pages render asynchronously, so a single extraction pass is
//! unreliable. The [`Scraper`] runs the strategy chain against a fresh
//! snapshot, and if nothing is found it waits a short interval and tries
//! again until the timeout elapses.

use crate::extract::{default_chain, NetworkExtractor, Strategy};
use crate::page::{PageSnapshot, PageSource};
use crate::{LeetcoachError, Problem, ProblemDraft, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for scraping a page
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Delay between attempts
    pub poll_interval: Duration,
    /// Total time allowed before giving up
    pub timeout: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(12),
        }
    }
}

/// Orchestrator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
    Idle,
    Attempting { attempt: u32 },
    Success,
    TimedOut,
}

/// Runs the extraction chain until a problem is found or time runs out
pub struct Scraper {
    config: ScrapeConfig,
    chain: Vec<Strategy>,
    state: ScrapeState,
}

impl Scraper {
    /// Structured data and DOM strategies only
    pub fn new(config: ScrapeConfig) -> Self {
        Self::with_chain(config, default_chain(None))
    }

    /// Structured data, DOM and the site API as a last resort
    pub fn with_network(config: ScrapeConfig, network: NetworkExtractor) -> Self {
        Self::with_chain(config, default_chain(Some(network)))
    }

    pub fn with_chain(config: ScrapeConfig, chain: Vec<Strategy>) -> Self {
        Self {
            config,
            chain,
            state: ScrapeState::Idle,
        }
    }

    pub fn state(&self) -> ScrapeState {
        self.state
    }

    fn transition(&mut self, next: ScrapeState) {
        debug!("Scrape state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Poll `source` until a problem is extracted or the timeout elapses.
    ///
    /// The timeout bounds the whole call: an attempt still waiting on a slow
    /// snapshot or site API is abandoned at the deadline.
    pub async fn scrape<S>(&mut self, source: &S) -> Result<Problem>
    where
        S: PageSource + ?Sized,
    {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let mut attempt = 0u32;
        self.transition(ScrapeState::Idle);

        loop {
            attempt += 1;
            self.transition(ScrapeState::Attempting { attempt });

            let outcome = tokio::time::timeout_at(deadline, self.poll_once(source, attempt)).await;
            match outcome {
                Ok(Some(draft)) => {
                    info!(
                        "Detected '{}' after {} attempt(s) in {:?}",
                        draft.title,
                        attempt,
                        started.elapsed()
                    );
                    self.transition(ScrapeState::Success);
                    return Ok(draft.stamp());
                }
                Ok(None) => {}
                Err(_) => debug!("Attempt {} still pending at the deadline", attempt),
            }

            let now = Instant::now();
            if now >= deadline {
                let waited = now - started;
                self.transition(ScrapeState::TimedOut);
                warn!("No problem detected after {:?}", waited);
                return Err(LeetcoachError::ProblemNotDetected { waited });
            }

            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    async fn poll_once<S>(&self, source: &S, attempt: u32) -> Option<ProblemDraft>
    where
        S: PageSource + ?Sized,
    {
        match source.snapshot().await {
            Ok(snapshot) => {
                debug!(
                    "Attempt {} on {} (document ready: {})",
                    attempt, snapshot.url, snapshot.ready
                );
                self.attempt(&snapshot).await
            }
            Err(e) => {
                warn!("Snapshot failed on attempt {}: {}", attempt, e);
                None
            }
        }
    }

    /// Run the chain once against a snapshot.
    ///
    /// Candidates whose slug contradicts the navigated slug describe some
    /// other problem and are discarded.
    pub async fn attempt(&self, snapshot: &PageSnapshot) -> Option<ProblemDraft> {
        let active_slug = snapshot.slug();

        for strategy in &self.chain {
            match strategy.extract(snapshot).await {
                Some(draft) if !active_slug.is_empty() && draft.slug != active_slug => {
                    debug!(
                        "Discarding {} candidate '{}': slug does not match '{}'",
                        strategy.name(),
                        draft.slug,
                        active_slug
                    );
                }
                Some(draft) => {
                    debug!("{} strategy matched", strategy.name());
                    return Some(draft);
                }
                None => debug!("{} strategy found nothing", strategy.name()),
            }
        }

        None
    }
}
