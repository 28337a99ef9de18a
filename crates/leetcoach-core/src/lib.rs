//! Leetcoach Core Library
//!
//! Core functionality for the leetcoach assistant including:
//! - Problem detection from live problem pages (structured data, DOM, site API)
//! - Bounded-time scrape orchestration over asynchronously rendered pages
//! - Request/response messaging between the UI, background and page contexts
//! - Streaming chat against the retrieval-augmented backend

pub mod bus;
pub mod chat;
pub mod chrome;
pub mod content;
pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod page;
pub mod scrape;
pub mod session;

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

// Re-export key types
pub use chat::{ChatClient, ChatResponse, ClientConfig, SourceDocument, StreamEvent};
pub use page::{PageSnapshot, PageSource};
pub use scrape::{ScrapeConfig, ScrapeState, Scraper};
pub use session::{ChatMessage, ChatSession, Role};

#[derive(Error, Debug)]
pub enum LeetcoachError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("could not detect a problem on this page (waited {waited:?})")]
    ProblemNotDetected { waited: Duration },

    #[error("no active problem; open a problem page first")]
    NoActiveProblem,

    #[error("backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("malformed stream line: {0}")]
    Protocol(String),

    #[error("stream completed without a final payload")]
    StreamIncomplete,

    #[error("backend reported an error: {0}")]
    StreamFailed(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("messaging error: {0}")]
    Messaging(String),
}

pub type Result<T> = std::result::Result<T, LeetcoachError>;

/// Problem difficulty, normalized to a closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Medium => write!(f, "Medium"),
            Difficulty::Hard => write!(f, "Hard"),
        }
    }
}

/// Placeholder used when no constraints block could be found
pub const CONSTRAINTS_NOT_DETECTED: &str = "Constraints not detected.";

/// Placeholder used when no description text could be extracted
pub const DESCRIPTION_UNAVAILABLE: &str = "Unable to extract problem description.";

/// A problem as produced by one extraction strategy, before it is stamped
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemDraft {
    pub title: String,
    pub difficulty: Difficulty,
    pub description: String,
    pub examples: Vec<String>,
    pub constraints: String,
    pub url: String,
    pub slug: String,
    pub problem_number: String,
}

impl ProblemDraft {
    /// Stamp the draft with the capture instant, producing the final snapshot
    pub fn stamp(self) -> Problem {
        Problem {
            title: self.title,
            difficulty: self.difficulty,
            description: self.description,
            examples: self.examples,
            constraints: self.constraints,
            url: self.url,
            slug: self.slug,
            problem_number: self.problem_number,
            timestamp: now_millis(),
        }
    }
}

/// Immutable snapshot of the problem open on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub title: String,
    pub difficulty: Difficulty,
    pub description: String,
    pub examples: Vec<String>,
    pub constraints: String,
    pub url: String,
    pub slug: String,
    pub problem_number: String,
    /// Capture instant in milliseconds since the Unix epoch
    pub timestamp: u64,
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Configuration for fetching problem pages
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Whether to render pages in headless Chrome
    pub javascript: bool,
    /// User agent string
    pub user_agent: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Whether to fall back to the site's GraphQL API
    pub use_network: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            javascript: false,
            user_agent: format!("leetcoach/{} (Problem Assistant)", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            use_network: true,
        }
    }
}
