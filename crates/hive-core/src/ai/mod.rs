//! Chat assistant plumbing
//!
//! - `retry` - exponential backoff with jitter
//! - `sse` - SSE record decoding into chunks
//! - `streaming` - chunk types and reply accumulation
//! - `client` - HTTP client for the chat API

pub mod client;
pub mod retry;
pub mod sse;
pub mod streaming;

pub use client::{ChatBackend, ChatClient, ChatError, ChatRequest, HistoryMessage};
pub use sse::{parse_chunk_stream, ChunkError, ChunkStream};
pub use streaming::{CompletedResponse, Source, StreamAccumulator, StreamChunk, StreamState};
