//! Newline-delimited JSON event stream decoding
//!
//! Transport chunks can split a line anywhere, including inside a multi-byte
//! character. [`LineBuffer`] keeps the trailing fragment until its newline
//! arrives; [`StreamReducer`] folds the complete lines into UI state and the
//! final answer.

use super::{ChatResponse, SourceDocument};
use crate::{LeetcoachError, Result};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::debug;

/// One line of the chat stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Next piece of the in-progress answer
    Token { token: String },
    /// Retrieved context used for the answer
    Sources { sources: Vec<SourceDocument> },
    /// Short takeaway, informational only
    Summary { summary: String },
    /// Terminal success carrying the authoritative answer
    End { payload: ChatResponse },
    /// Terminal success served from the backend cache
    Cached { payload: ChatResponse },
    /// Terminal failure
    Error { message: String },
}

/// Longest line accepted before the stream is rejected
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Splits incoming bytes into complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    ///
    /// Fails once the unterminated remainder exceeds [`MAX_LINE_BYTES`].
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }

        if self.pending.len() > MAX_LINE_BYTES {
            let size = self.pending.len();
            self.pending.clear();
            return Err(LeetcoachError::Protocol(format!(
                "line exceeds {} bytes without a newline ({} buffered)",
                MAX_LINE_BYTES, size
            )));
        }
        Ok(lines)
    }

    /// Whatever is left once the stream has closed, if it is not blank
    pub fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

/// What the UI shows while an answer streams in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamState {
    /// Tokens received so far; replaced by the final answer on completion
    pub answer: String,
    pub summary: Option<String>,
    pub sources: Vec<SourceDocument>,
    /// Set once a terminal success event arrives
    pub response: Option<ChatResponse>,
    pub cached: bool,
}

/// Folds stream bytes into [`StreamState`]
#[derive(Debug, Default)]
pub struct StreamReducer {
    buffer: LineBuffer,
    state: StreamState,
}

impl StreamReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state.response.is_some()
    }

    /// Feed one transport chunk, returning the events it completed in order
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        let mut events = Vec::new();
        for line in self.buffer.push(chunk)? {
            if let Some(event) = self.apply_line(&line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Flush the trailing fragment and resolve the final response
    pub fn finish(mut self) -> Result<ChatResponse> {
        if let Some(rest) = self.buffer.finish() {
            self.apply_line(&rest)?;
        }
        self.state.response.ok_or(LeetcoachError::StreamIncomplete)
    }

    fn apply_line(&mut self, line: &str) -> Result<Option<StreamEvent>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        if self.is_complete() {
            debug!("Ignoring line after terminal event");
            return Ok(None);
        }

        let event: StreamEvent = serde_json::from_str(line)
            .map_err(|e| LeetcoachError::Protocol(format!("{} in {:?}", e, truncate(line, 80))))?;
        self.apply(&event)?;
        Ok(Some(event))
    }

    fn apply(&mut self, event: &StreamEvent) -> Result<()> {
        match event {
            StreamEvent::Token { token } => self.state.answer.push_str(token),
            StreamEvent::Sources { sources } => self.state.sources = sources.clone(),
            StreamEvent::Summary { summary } => self.state.summary = Some(summary.clone()),
            StreamEvent::End { payload } | StreamEvent::Cached { payload } => {
                self.state.answer = payload.answer.clone();
                self.state.summary = Some(payload.summary.clone());
                self.state.sources = payload.sources.clone();
                self.state.cached = matches!(event, StreamEvent::Cached { .. });
                self.state.response = Some(payload.clone());
            }
            StreamEvent::Error { message } => {
                return Err(LeetcoachError::StreamFailed(message.clone()));
            }
        }
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Drive `stream` through a reducer until it ends or `cancelled` resolves.
///
/// `on_event` sees every event together with the state after applying it.
/// Returning early drops the stream, which releases the underlying reader.
pub async fn consume<S, B, E, C, F>(stream: S, cancelled: C, mut on_event: F) -> Result<ChatResponse>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<LeetcoachError>,
    C: Future<Output = ()>,
    F: FnMut(&StreamEvent, &StreamState),
{
    let mut reducer = StreamReducer::new();
    tokio::pin!(stream);
    tokio::pin!(cancelled);

    loop {
        tokio::select! {
            biased;
            _ = &mut cancelled => {
                debug!("Chat stream cancelled");
                return Err(LeetcoachError::Cancelled);
            }
            next = stream.next() => match next {
                Some(chunk) => {
                    let chunk = chunk.map_err(Into::<LeetcoachError>::into)?;
                    for event in reducer.feed(chunk.as_ref())? {
                        on_event(&event, reducer.state());
                    }
                    if reducer.is_complete() {
                        break;
                    }
                }
                None => break,
            }
        }
    }

    reducer.finish()
}
