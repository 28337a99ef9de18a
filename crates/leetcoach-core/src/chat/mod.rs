//! Backend client: streaming chat, health and document sync

pub mod stream;

use crate::session::Role;
use crate::{Difficulty, LeetcoachError, Problem, Result, CONSTRAINTS_NOT_DETECTED};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

pub use stream::{StreamEvent, StreamReducer, StreamState};

/// Backend address used when none is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";

/// A retrieved context snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub title: String,
    pub snippet: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Final answer for one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    pub answer: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub sources: Vec<SourceDocument>,
}

fn default_true() -> bool {
    true
}

/// Problem context sent with every question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemContext {
    pub slug: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub description: String,
    pub url: String,
}

impl From<&Problem> for ProblemContext {
    fn from(problem: &Problem) -> Self {
        Self {
            slug: problem.slug.clone(),
            title: problem.title.clone(),
            difficulty: problem.difficulty,
            description: problem.description.clone(),
            url: problem.url.clone(),
        }
    }
}

/// Earlier turn of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    pub problem: ProblemContext,
    pub history: Vec<HistoryEntry>,
}

/// One indexed section of a problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub heading: String,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

/// Body of `POST /documents`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub slug: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub url: String,
    pub description: String,
    pub examples: Vec<String>,
    pub constraints: String,
    pub chunks: Vec<DocumentChunk>,
}

impl From<&Problem> for IngestRequest {
    fn from(problem: &Problem) -> Self {
        let constraints = if problem.constraints == CONSTRAINTS_NOT_DETECTED {
            String::new()
        } else {
            problem.constraints.clone()
        };

        let mut chunks = Vec::new();
        if !problem.description.is_empty() {
            chunks.push(DocumentChunk {
                heading: "Problem description".to_string(),
                content: problem.description.clone(),
                metadata: BTreeMap::from([
                    ("section".to_string(), "description".to_string()),
                    ("difficulty".to_string(), problem.difficulty.to_string()),
                ]),
            });
        }
        if !constraints.is_empty() {
            chunks.push(DocumentChunk {
                heading: "Constraints".to_string(),
                content: constraints.clone(),
                metadata: BTreeMap::from([("section".to_string(), "constraints".to_string())]),
            });
        }
        if !problem.examples.is_empty() {
            chunks.push(DocumentChunk {
                heading: "Worked examples".to_string(),
                content: problem.examples.join("\n\n"),
                metadata: BTreeMap::from([
                    ("section".to_string(), "examples".to_string()),
                    ("count".to_string(), problem.examples.len().to_string()),
                ]),
            });
        }

        Self {
            slug: problem.slug.clone(),
            title: problem.title.clone(),
            difficulty: problem.difficulty,
            url: problem.url.clone(),
            description: problem.description.clone(),
            examples: problem.examples.clone(),
            constraints,
            chunks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    pub chunks_indexed: usize,
}

/// Configuration for the backend client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL including the API prefix
    pub base_url: String,
    /// Timeout for non-streaming requests, in seconds
    pub timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            user_agent: format!("leetcoach/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Client for the assistant backend
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: Client,
    config: ClientConfig,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Whether the backend answers its health check
    pub async fn health(&self) -> bool {
        match self
            .client
            .get(self.endpoint("health"))
            .timeout(self.request_timeout())
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        }
    }

    /// Ask a question and stream the answer.
    ///
    /// `on_event` observes every stream event with the state after it was
    /// applied. Resolving `cancelled` stops reading and returns
    /// [`LeetcoachError::Cancelled`].
    pub async fn stream_chat<C, F>(
        &self,
        request: &ChatRequest,
        cancelled: C,
        on_event: F,
    ) -> Result<ChatResponse>
    where
        C: Future<Output = ()>,
        F: FnMut(&StreamEvent, &StreamState),
    {
        info!("Asking about '{}' ({} history turns)", request.problem.slug, request.history.len());

        let send = self.client.post(self.endpoint("chat/stream")).json(request).send();
        tokio::pin!(cancelled);
        let response = tokio::select! {
            biased;
            _ = &mut cancelled => return Err(LeetcoachError::Cancelled),
            response = send => check_status(response?).await?,
        };

        stream::consume(response.bytes_stream(), cancelled, on_event).await
    }

    /// Index a freshly scraped problem on the backend
    pub async fn sync_problem(&self, problem: &Problem) -> Result<IngestResponse> {
        let response = self
            .client
            .post(self.endpoint("documents"))
            .timeout(self.request_timeout())
            .json(&IngestRequest::from(problem))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

/// Turn non-2xx responses into [`LeetcoachError::Backend`] carrying the body text
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LeetcoachError::Backend {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve one canned response on a local port.
    ///
    /// `body` is written in the given pieces with a pause between them; the
    /// request text is sent back once it has been read completely.
    async fn serve_once(head: &'static str, body: Vec<&'static str>) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let _ = tx.send(request);

            socket.write_all(head.as_bytes()).await.unwrap();
            for piece in body {
                socket.write_all(piece.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            socket.shutdown().await.unwrap();
        });

        (format!("http://{}/api/v1", addr), rx)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&data).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    fn client_for(base_url: String) -> ChatClient {
        ChatClient::new(ClientConfig {
            base_url,
            timeout_secs: 5,
            ..Default::default()
        })
        .unwrap()
    }

    fn ask_request() -> ChatRequest {
        ChatRequest {
            question: "Hint?".to_string(),
            problem: ProblemContext::from(&problem()),
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_stream_chat_reads_split_body() {
        let (base, request) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n",
            vec![
                "{\"type\":\"token\",\"token\":\"Hi\"}\n{\"type\":\"tok",
                "en\",\"token\":\" there\"}\n",
                "{\"type\":\"end\",\"payload\":{\"answer\":\"Use a hash map.\",\"summary\":\"- O(n)\"}}\n",
            ],
        )
        .await;
        let client = client_for(base);

        let mut tokens = Vec::new();
        let response = client
            .stream_chat(&ask_request(), std::future::pending(), |event, _| {
                if let StreamEvent::Token { token } = event {
                    tokens.push(token.clone());
                }
            })
            .await
            .unwrap();

        assert_eq!(tokens, vec!["Hi", " there"]);
        assert_eq!(response.answer, "Use a hash map.");
        assert_eq!(response.summary, "- O(n)");

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /api/v1/chat/stream "));
        assert!(request.contains("\"question\":\"Hint?\""));
    }

    #[tokio::test]
    async fn test_stream_without_terminal_event() {
        let (base, _request) = serve_once(
            "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n",
            vec!["{\"type\":\"token\",\"token\":\"Hi\"}\n"],
        )
        .await;

        let err = client_for(base)
            .stream_chat(&ask_request(), std::future::pending(), |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, LeetcoachError::StreamIncomplete));
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let (base, _request) = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 14\r\nConnection: close\r\n\r\n",
            vec!["vector db down"],
        )
        .await;

        let err = client_for(base)
            .stream_chat(&ask_request(), std::future::pending(), |_, _| {})
            .await
            .unwrap_err();
        match err {
            LeetcoachError::Backend { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "vector db down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_before_response_headers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // Accept and read, but never answer
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = read_request(&mut socket).await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = client_for(format!("http://{}/api/v1", addr));
        let err = client
            .stream_chat(
                &ask_request(),
                tokio::time::sleep(Duration::from_millis(100)),
                |_, _| {},
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LeetcoachError::Cancelled));
        server.abort();
    }

    #[tokio::test]
    async fn test_sync_problem_posts_chunks() {
        let body = r#"{"success":true,"chunks_indexed":2}"#;
        let (base, request) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 35\r\nConnection: close\r\n\r\n",
            vec![body],
        )
        .await;

        let response = client_for(base).sync_problem(&problem()).await.unwrap();
        assert_eq!(response.chunks_indexed, 2);

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /api/v1/documents "));
        assert!(request.contains("\"heading\":\"Worked examples\""));
    }

    #[tokio::test]
    async fn test_sync_problem_rejected() {
        let (base, _request) = serve_once(
            "HTTP/1.1 422 Unprocessable Entity\r\nContent-Length: 11\r\nConnection: close\r\n\r\n",
            vec!["bad payload"],
        )
        .await;

        let err = client_for(base).sync_problem(&problem()).await.unwrap_err();
        assert!(matches!(err, LeetcoachError::Backend { status: 422, .. }));
        assert!(err.to_string().contains("bad payload"));
    }

    fn problem() -> Problem {
        Problem {
            title: "Two Sum".to_string(),
            difficulty: Difficulty::Easy,
            description: "Find two numbers.".to_string(),
            examples: vec!["Input: [2,7]".to_string(), "Input: [3,3]".to_string()],
            constraints: CONSTRAINTS_NOT_DETECTED.to_string(),
            url: "https://leetcode.com/problems/two-sum/".to_string(),
            slug: "two-sum".to_string(),
            problem_number: "1".to_string(),
            timestamp: 1,
        }
    }

    #[test]
    fn test_chat_request_wire_shape() {
        let request = ChatRequest {
            question: "Hint?".to_string(),
            problem: ProblemContext::from(&problem()),
            history: vec![HistoryEntry {
                role: Role::Assistant,
                content: "Hello".to_string(),
            }],
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["problem"]["difficulty"], "Easy");
        assert_eq!(value["problem"]["slug"], "two-sum");
        assert_eq!(value["history"][0]["role"], "assistant");
        assert!(value["problem"].get("examples").is_none());
    }

    #[test]
    fn test_ingest_chunks_skip_sentinel_constraints() {
        let request = IngestRequest::from(&problem());
        assert_eq!(request.constraints, "");

        let headings: Vec<_> = request.chunks.iter().map(|c| c.heading.as_str()).collect();
        assert_eq!(headings, vec!["Problem description", "Worked examples"]);
        assert_eq!(request.chunks[1].content, "Input: [2,7]\n\nInput: [3,3]");
        assert_eq!(request.chunks[1].metadata["count"], "2");
    }

    #[test]
    fn test_ingest_includes_detected_constraints() {
        let mut p = problem();
        p.constraints = "1 <= n".to_string();
        let request = IngestRequest::from(&p);
        assert_eq!(request.chunks.len(), 3);
        assert_eq!(request.chunks[1].heading, "Constraints");
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let client = ChatClient::new(ClientConfig {
            base_url: "http://localhost:8000/api/v1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.endpoint("chat/stream"), "http://localhost:8000/api/v1/chat/stream");
    }

    #[tokio::test]
    async fn test_health_unreachable_is_false() {
        let client = ChatClient::new(ClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();
        assert!(!client.health().await);
    }

    #[test]
    fn test_response_defaults() {
        let response: ChatResponse = serde_json::from_str(r#"{"answer":"A"}"#).unwrap();
        assert!(response.success);
        assert_eq!(response.summary, "");
        assert!(response.sources.is_empty());
    }
}
