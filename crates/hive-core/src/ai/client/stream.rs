//! Streaming chat calls

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::core::ChatClient;
use super::error::ChatError;
use crate::ai::retry::with_retry;
use crate::ai::sse::{parse_chunk_stream, ChunkStream};

/// Prior turn sent along with a new message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

/// Body of a streamed chat call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

/// Anything that can open a chunk stream for a chat request
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ChatError>;
}

impl ChatClient {
    /// Send the request once and return the raw response on success
    async fn send_once(&self, request: &ChatRequest) -> Result<reqwest::Response, ChatError> {
        let response = self
            .build_request(&self.chat_url())
            .json(request)
            .send()
            .await?;
        self.handle_error_response(response).await
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    /// Open the reply stream, retrying the connection on transient failures
    ///
    /// Only establishing the response is retried; once chunks flow, failures
    /// surface through the stream.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ChatError> {
        info!(
            "Opening chat stream for session {} ({} history messages)",
            request.session_id,
            request.history.len()
        );

        let response = with_retry(self.retry_config(), || self.send_once(request)).await?;
        Ok(parse_chunk_stream(Box::pin(response.bytes_stream())))
    }
}
