//! Streaming types for chat assistant responses

use serde::{Deserialize, Serialize};

/// Wiki article cited by the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub slug: String,
    pub category: String,
}

/// Chunks that can be streamed from the chat API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// Text delta
    Content(String),

    /// Articles the answer was grounded on
    Sources(Vec<Source>),

    /// Server-reported failure
    Error(String),

    /// End of stream
    Done,
}

impl StreamChunk {
    /// Whether this chunk ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamChunk::Done | StreamChunk::Error(_))
    }
}

/// Lifecycle of a single response stream
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum StreamState {
    #[default]
    Reading,
    Done,
    Failed(String),
}

/// Folds chunks into the final assistant message
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    sources: Option<Vec<Source>>,
    state: StreamState,
}

/// Final text and citations of a completed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedResponse {
    pub content: String,
    pub sources: Vec<Source>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one chunk. Chunks arriving after a terminal state are ignored.
    pub fn apply(&mut self, chunk: &StreamChunk) {
        if self.is_terminal() {
            tracing::debug!("Ignoring chunk after terminal state: {:?}", chunk);
            return;
        }

        match chunk {
            StreamChunk::Content(delta) => self.content.push_str(delta),
            StreamChunk::Sources(sources) => self.sources = Some(sources.clone()),
            StreamChunk::Error(message) => {
                self.state = StreamState::Failed(message.clone())
            }
            StreamChunk::Done => self.state = StreamState::Done,
        }
    }

    /// Mark a transport-level failure. Does not override an earlier error chunk.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.is_terminal() {
            self.state = StreamState::Failed(reason.into());
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.state, StreamState::Reading)
    }

    /// Text accumulated so far
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Last sources payload seen, if any
    pub fn sources(&self) -> Option<&[Source]> {
        self.sources.as_deref()
    }

    /// Consume the accumulator once the stream is `Done`
    pub fn into_completed(self) -> Option<CompletedResponse> {
        match self.state {
            StreamState::Done => Some(CompletedResponse {
                content: self.content,
                sources: self.sources.unwrap_or_default(),
            }),
            _ => None,
        }
    }
}
