//! Rate limiting and retry logic
//!
//! Provides exponential backoff with jitter for handling API rate limits and transient errors.
//!
//! Used by the chat client to retry opening a response stream on rate limiting (429)
//! and server errors (500, 502, 503, 504).

mod backoff;

pub use backoff::{always_retry, with_retry, with_retry_if, IsRetryable, RetryConfig, RetryError};
