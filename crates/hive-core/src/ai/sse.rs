//! SSE (Server-Sent Events) stream processing utilities
//!
//! Decodes `data: <json>\n\n` records from the chat API into [`StreamChunk`]s.

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::streaming::{Source, StreamChunk};

/// Stream of decoded chunks, as handed to chat consumers
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, ChunkError>>;

/// Errors surfaced while reading a chunk stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    /// A single record could not be decoded. The stream keeps going.
    #[error("failed to parse SSE record #{record}: {message}")]
    Parse {
        record: usize,
        message: String,
        payload: String,
    },
    /// The underlying reader failed. The stream ends after this.
    #[error("stream transport error: {0}")]
    Transport(String),
}

impl ChunkError {
    pub fn is_parse(&self) -> bool {
        matches!(self, ChunkError::Parse { .. })
    }
}

/// Incremental line splitter over arbitrary byte boundaries
///
/// Bytes are held until a newline arrives, so UTF-8 sequences split across
/// reads are decoded whole.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    partial: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every line they complete, without terminators
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.partial[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.partial[start..end]));
            start = end + 1;
        }
        self.partial.drain(..start);
        lines
    }

    /// Flush a trailing line that never got its newline
    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let line = decode_line(&self.partial);
        self.partial.clear();
        Some(line)
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Decode a single JSON payload (`{"type": ..., "data": ...}`)
pub fn parse_chunk_payload(data: &str) -> Result<StreamChunk, String> {
    if data.trim() == "[DONE]" {
        return Ok(StreamChunk::Done);
    }

    let json: Value = serde_json::from_str(data).map_err(|e| e.to_string())?;
    let chunk_type = json
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| "missing \"type\" field".to_string())?;
    let payload = json.get("data").unwrap_or(&Value::Null);

    match chunk_type {
        "content" => payload
            .as_str()
            .map(|s| StreamChunk::Content(s.to_string()))
            .ok_or_else(|| "content chunk without string data".to_string()),
        "sources" => serde_json::from_value::<Vec<Source>>(payload.clone())
            .map(StreamChunk::Sources)
            .map_err(|e| format!("invalid sources payload: {}", e)),
        "error" => Ok(StreamChunk::Error(
            payload
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| payload.to_string()),
        )),
        "done" => Ok(StreamChunk::Done),
        other => Err(format!("unknown chunk type: {}", other)),
    }
}

/// Per-stream record decoder that tracks counters for logging
struct RecordDecoder {
    record_count: usize,
    bytes_received: usize,
    stream_start: Instant,
}

impl RecordDecoder {
    fn new() -> Self {
        Self {
            record_count: 0,
            bytes_received: 0,
            stream_start: Instant::now(),
        }
    }

    fn decode(&mut self, line: &str) -> Option<Result<StreamChunk, ChunkError>> {
        // Skip blank record separators and SSE comments
        if line.is_empty() || line.starts_with(':') {
            return None;
        }

        let Some(data) = line.strip_prefix("data:") else {
            debug!("Ignoring non-data SSE field: {}", line);
            return None;
        };
        let data = data.strip_prefix(' ').unwrap_or(data);

        self.record_count += 1;
        match parse_chunk_payload(data) {
            Ok(chunk) => {
                debug!(
                    "SSE record #{} at {:?}: {:?}",
                    self.record_count,
                    self.stream_start.elapsed(),
                    chunk_kind(&chunk)
                );
                Some(Ok(chunk))
            }
            Err(message) => {
                warn!(
                    "Failed to parse SSE record #{}: {} ({})",
                    self.record_count, message, data
                );
                Some(Err(ChunkError::Parse {
                    record: self.record_count,
                    message,
                    payload: data.to_string(),
                }))
            }
        }
    }
}

fn chunk_kind(chunk: &StreamChunk) -> &'static str {
    match chunk {
        StreamChunk::Content(_) => "content",
        StreamChunk::Sources(_) => "sources",
        StreamChunk::Error(_) => "error",
        StreamChunk::Done => "done",
    }
}

struct ChunkStreamState<S> {
    /// Dropped as soon as the stream reaches a terminal state
    inner: Option<S>,
    buffer: SseLineBuffer,
    decoder: RecordDecoder,
    pending: VecDeque<Result<StreamChunk, ChunkError>>,
}

impl<S> ChunkStreamState<S> {
    fn close(&mut self, reason: &str) {
        if self.inner.take().is_some() {
            info!(
                "SSE stream {} after {:?}: {} records, {} bytes",
                reason,
                self.decoder.stream_start.elapsed(),
                self.decoder.record_count,
                self.decoder.bytes_received
            );
        }
    }
}

/// Turn a raw byte stream into a lazy stream of chunks
///
/// The returned stream yields chunks in arrival order and ends after a
/// `Done` or `Error` chunk, a transport error, or end of input. Malformed
/// records are yielded as [`ChunkError::Parse`] without ending the stream.
/// Dropping it drops the underlying reader.
pub fn parse_chunk_stream<S, E>(byte_stream: S) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = ChunkStreamState {
        inner: Some(byte_stream),
        buffer: SseLineBuffer::new(),
        decoder: RecordDecoder::new(),
        pending: VecDeque::new(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if matches!(&item, Ok(chunk) if chunk.is_terminal()) {
                    state.pending.clear();
                    state.close("finished");
                }
                return Some((item, state));
            }

            let inner = state.inner.as_mut()?;
            match inner.next().await {
                Some(Ok(bytes)) => {
                    state.decoder.bytes_received += bytes.len();
                    for line in state.buffer.push(&bytes) {
                        if let Some(item) = state.decoder.decode(&line) {
                            state.pending.push_back(item);
                        }
                    }
                }
                Some(Err(e)) => {
                    state.close("failed");
                    return Some((Err(ChunkError::Transport(e.to_string())), state));
                }
                None => {
                    if let Some(line) = state.buffer.finish() {
                        if let Some(item) = state.decoder.decode(&line) {
                            state.pending.push_back(item);
                        }
                    }
                    state.close("ended");
                    // Remaining pending items are still delivered; the next
                    // empty pass returns None because `inner` is gone.
                    if state.pending.is_empty() {
                        return None;
                    }
                }
            }
        }
    })
    .boxed()
}
