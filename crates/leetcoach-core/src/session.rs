//! Chat transcript and UI session
//!
//! A [`ChatSession`] owns the transcript for one panel. Nothing here is
//! persisted; switching to a different problem discards the conversation.

use crate::chat::{ChatClient, ChatRequest, ChatResponse, HistoryEntry, ProblemContext, StreamEvent};
use crate::{now_millis, LeetcoachError, Problem, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageStatus {
    Complete,
    /// Assistant message still receiving tokens
    Streaming,
    /// Assistant message whose request failed
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: u64,
    pub status: MessageStatus,
}

/// Append-only list of messages.
///
/// Only the assistant message currently streaming may change after it is
/// pushed.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> usize {
        self.push(ChatMessage {
            role: Role::User,
            content: content.into(),
            timestamp: now_millis(),
            status: MessageStatus::Complete,
        })
    }

    /// Start an empty assistant message that will receive tokens
    pub fn begin_assistant(&mut self) -> usize {
        self.push(ChatMessage {
            role: Role::Assistant,
            content: String::new(),
            timestamp: now_millis(),
            status: MessageStatus::Streaming,
        })
    }

    fn push(&mut self, message: ChatMessage) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    fn streaming_mut(&mut self, index: usize) -> Option<&mut ChatMessage> {
        self.messages
            .get_mut(index)
            .filter(|m| m.status == MessageStatus::Streaming)
    }

    pub fn append_token(&mut self, index: usize, token: &str) {
        if let Some(message) = self.streaming_mut(index) {
            message.content.push_str(token);
        }
    }

    /// Replace the streamed preview with the authoritative answer
    pub fn complete(&mut self, index: usize, answer: &str) {
        if let Some(message) = self.streaming_mut(index) {
            message.content = answer.to_string();
            message.status = MessageStatus::Complete;
        }
    }

    pub fn fail(&mut self, index: usize, reason: impl Into<String>) {
        if let Some(message) = self.streaming_mut(index) {
            message.status = MessageStatus::Failed(reason.into());
        }
    }

    /// Completed turns, in order, as sent to the backend.
    ///
    /// A question whose answer failed or is still streaming is left out
    /// together with that answer, so roles keep alternating.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.messages
            .iter()
            .enumerate()
            .filter(|(i, m)| {
                let answered = match m.role {
                    Role::User => self
                        .messages
                        .get(i + 1)
                        .map(|next| next.status == MessageStatus::Complete)
                        .unwrap_or(true),
                    Role::Assistant => true,
                };
                answered && m.status == MessageStatus::Complete
            })
            .map(|(_, m)| HistoryEntry {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Conversation about one problem
pub struct ChatSession {
    client: ChatClient,
    problem: Option<Problem>,
    transcript: Transcript,
}

impl ChatSession {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            problem: None,
            transcript: Transcript::new(),
        }
    }

    pub fn problem(&self) -> Option<&Problem> {
        self.problem.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    /// Replace the active problem; a different slug starts a fresh conversation
    pub fn set_problem(&mut self, problem: Problem) {
        let same = self
            .problem
            .as_ref()
            .map(|current| current.slug == problem.slug)
            .unwrap_or(false);
        if !same {
            debug!("Switching conversation to '{}'", problem.slug);
            self.transcript.clear();
        }
        self.problem = Some(problem);
    }

    /// Ask a question about the active problem.
    ///
    /// `on_update` is called with the assistant message after every token and
    /// once more when it completes. On failure only that message is marked
    /// failed; earlier turns are untouched.
    pub async fn ask<C, F>(&mut self, question: &str, cancelled: C, mut on_update: F) -> Result<ChatResponse>
    where
        C: Future<Output = ()>,
        F: FnMut(&ChatMessage),
    {
        let problem = self.problem.as_ref().ok_or(LeetcoachError::NoActiveProblem)?;
        let request = ChatRequest {
            question: question.to_string(),
            problem: ProblemContext::from(problem),
            history: self.transcript.history(),
        };

        self.transcript.push_user(question);
        let index = self.transcript.begin_assistant();

        let transcript = &mut self.transcript;
        let result = self
            .client
            .stream_chat(&request, cancelled, |event, _| {
                if let StreamEvent::Token { token } = event {
                    transcript.append_token(index, token);
                    if let Some(message) = transcript.messages().get(index) {
                        on_update(message);
                    }
                }
            })
            .await;

        match &result {
            Ok(response) => self.transcript.complete(index, &response.answer),
            Err(e) => {
                warn!("Chat request failed: {}", e);
                self.transcript.fail(index, e.to_string());
            }
        }
        if let Some(message) = self.transcript.messages().get(index) {
            on_update(message);
        }

        result
    }
}
