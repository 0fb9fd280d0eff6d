//! Chat error types

use thiserror::Error;

use crate::ai::retry::IsRetryable;

/// Errors from sending a chat message and reading its reply
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("rate limited, retry in {wait_ms}ms")]
    RateLimited { wait_ms: u64 },

    #[error("chat API returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("chat API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Error chunk sent by the server. Authoritative over a closed stream.
    #[error("assistant error: {0}")]
    Remote(String),

    #[error("response stream closed before completion")]
    StreamClosed,

    #[error("response stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("chat session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// HTTP status codes worth retrying
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

impl IsRetryable for ChatError {
    fn is_retryable(&self) -> bool {
        match self {
            ChatError::Http { status, .. } => is_retryable_status(*status),
            ChatError::Transport(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}
