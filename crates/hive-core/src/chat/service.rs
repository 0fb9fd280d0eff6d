//! Chat send flow: rate limit, persist, stream, persist

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::session::{ChatMessage, ChatSession, MessageRole, SessionStore};
use crate::ai::client::{ChatBackend, ChatClient, ChatError, ChatRequest, HistoryMessage};
use crate::ai::sse::ChunkError;
use crate::ai::streaming::{StreamAccumulator, StreamChunk, StreamState};
use crate::config::HiveConfig;
use crate::ratelimit::RateLimiter;
use crate::storage::Database;

/// Assistant reply persisted after a completed stream
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub session_id: String,
    pub message: ChatMessage,
}

/// Coordinates the limiter, the chat backend and session storage
pub struct ChatService {
    backend: Arc<dyn ChatBackend>,
    limiter: Arc<RateLimiter>,
    db: Arc<Mutex<Database>>,
}

impl ChatService {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        limiter: Arc<RateLimiter>,
        db: Arc<Mutex<Database>>,
    ) -> Self {
        Self {
            backend,
            limiter,
            db,
        }
    }

    /// Build the service from configuration: HTTP client, limiter and database
    pub fn from_config(config: &HiveConfig) -> anyhow::Result<Self> {
        let client = ChatClient::new(config.chat.clone(), config.retry.clone())?;
        let db = Database::open(&config.database_path()?)?;
        Ok(Self::new(
            Arc::new(client),
            Arc::new(RateLimiter::new(config.rate_limit.clone())),
            Arc::new(Mutex::new(db)),
        ))
    }

    /// Send a message and stream the assistant's reply
    ///
    /// Creates a session when `session_id` is `None`. Each chunk is forwarded
    /// to `chunk_tx` as it arrives. The reply is only persisted once the
    /// stream reports `Done`.
    pub async fn send_message(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        text: &str,
        cancel: &CancellationToken,
        chunk_tx: Option<&mpsc::UnboundedSender<StreamChunk>>,
    ) -> Result<ChatReply, ChatError> {
        let decision = self.limiter.check_limit(user_id);
        if !decision.allowed {
            info!(
                "Chat rate limit for {}: retry in {}ms",
                user_id, decision.wait_time_ms
            );
            return Err(ChatError::RateLimited {
                wait_ms: decision.wait_time_ms,
            });
        }

        let request = {
            let db = self.db.lock();
            let store = SessionStore::new(db.conn());
            let session = match session_id {
                Some(id) => owned_session(&store, user_id, id)?,
                None => store.create(user_id, None)?,
            };

            let history = store
                .messages(&session.id)?
                .into_iter()
                .map(|m| HistoryMessage {
                    role: m.role.to_string(),
                    content: m.content,
                })
                .collect();
            store.add_message(&session.id, MessageRole::User, text, &[])?;

            ChatRequest {
                session_id: session.id,
                message: text.to_string(),
                history,
            }
        };

        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            opened = self.backend.open_stream(&request) => opened?,
        };

        let mut acc = StreamAccumulator::new();
        let mut transport_error = None;
        let mut parse_errors = 0usize;

        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Chat stream for session {} cancelled", request.session_id);
                    return Err(ChatError::Cancelled);
                }
                item = stream.next() => item,
            };

            match item {
                Some(Ok(chunk)) => {
                    if let Some(tx) = chunk_tx {
                        let _ = tx.send(chunk.clone());
                    }
                    acc.apply(&chunk);
                    if acc.is_terminal() {
                        break;
                    }
                }
                Some(Err(ChunkError::Parse { record, message, .. })) => {
                    parse_errors += 1;
                    warn!("Skipping malformed record #{}: {}", record, message);
                }
                Some(Err(ChunkError::Transport(message))) => {
                    transport_error = Some(message);
                    break;
                }
                None => break,
            }
        }
        drop(stream);

        debug!(
            "Chat stream for session {} ended in {:?} ({} malformed records)",
            request.session_id,
            acc.state(),
            parse_errors
        );

        match acc.state() {
            StreamState::Done => {}
            StreamState::Failed(reason) => return Err(ChatError::Remote(reason.clone())),
            StreamState::Reading => {
                return Err(match transport_error {
                    Some(message) => ChatError::StreamInterrupted(message),
                    None => ChatError::StreamClosed,
                })
            }
        }

        let completed = match acc.into_completed() {
            Some(completed) => completed,
            None => return Err(ChatError::StreamClosed),
        };

        let db = self.db.lock();
        let message = SessionStore::new(db.conn()).add_message(
            &request.session_id,
            MessageRole::Assistant,
            &completed.content,
            &completed.sources,
        )?;

        Ok(ChatReply {
            session_id: request.session_id,
            message,
        })
    }

    /// Sessions owned by a user, most recent first
    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, ChatError> {
        let db = self.db.lock();
        Ok(SessionStore::new(db.conn()).list_for_user(user_id)?)
    }

    /// Full message history of a user's session
    pub fn history(&self, user_id: &str, session_id: &str) -> Result<Vec<ChatMessage>, ChatError> {
        let db = self.db.lock();
        let store = SessionStore::new(db.conn());
        owned_session(&store, user_id, session_id)?;
        Ok(store.messages(session_id)?)
    }

    pub fn rename_session(
        &self,
        user_id: &str,
        session_id: &str,
        title: &str,
    ) -> Result<(), ChatError> {
        let db = self.db.lock();
        let store = SessionStore::new(db.conn());
        owned_session(&store, user_id, session_id)?;
        store.rename(session_id, title)?;
        Ok(())
    }

    pub fn delete_session(&self, user_id: &str, session_id: &str) -> Result<(), ChatError> {
        let db = self.db.lock();
        let store = SessionStore::new(db.conn());
        owned_session(&store, user_id, session_id)?;
        store.delete(session_id)?;
        info!("Deleted chat session {}", session_id);
        Ok(())
    }
}

/// Load a session, hiding sessions that belong to someone else
fn owned_session(
    store: &SessionStore<'_>,
    user_id: &str,
    session_id: &str,
) -> Result<ChatSession, ChatError> {
    match store.get(session_id)? {
        Some(session) if session.user_id == user_id => Ok(session),
        _ => Err(ChatError::SessionNotFound(session_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::sse::{parse_chunk_stream, ChunkStream};
    use crate::ratelimit::RateLimitConfig;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;

    /// Backend that replays canned SSE bytes and records requests
    struct ScriptedBackend {
        body: &'static str,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        fn new(body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                body,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn open_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ChatError> {
            self.requests.lock().push(request.clone());
            let parts: Vec<Result<Bytes, std::io::Error>> =
                vec![Ok(Bytes::from_static(self.body.as_bytes()))];
            Ok(parse_chunk_stream(stream::iter(parts)))
        }
    }

    /// Backend whose stream never produces anything
    struct StalledBackend;

    #[async_trait]
    impl ChatBackend for StalledBackend {
        async fn open_stream(&self, _request: &ChatRequest) -> Result<ChunkStream, ChatError> {
            Ok(parse_chunk_stream(stream::pending::<
                Result<Bytes, std::io::Error>,
            >()))
        }
    }

    const HAPPY_BODY: &str = concat!(
        "data: {\"type\":\"content\",\"data\":\"The library \"}\n\n",
        "data: {\"type\":\"sources\",\"data\":[{\"title\":\"Main Library\",\"slug\":\"main-library\",\"category\":\"places\"}]}\n\n",
        "data: {\"type\":\"content\",\"data\":\"opens at 8.\"}\n\n",
        "data: {\"type\":\"done\",\"data\":null}\n\n",
    );

    fn service(backend: Arc<dyn ChatBackend>, max_requests: u32) -> ChatService {
        let db = Database::open_in_memory().unwrap();
        ChatService::new(
            backend,
            Arc::new(RateLimiter::new(RateLimitConfig::new(max_requests, 60_000))),
            Arc::new(Mutex::new(db)),
        )
    }

    #[tokio::test]
    async fn test_send_message_persists_reply() {
        let backend = ScriptedBackend::new(HAPPY_BODY);
        let service = service(backend.clone(), 10);
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let reply = service
            .send_message("u1", None, "When does the library open?", &cancel, Some(&tx))
            .await
            .unwrap();

        assert_eq!(reply.message.content, "The library opens at 8.");
        assert_eq!(reply.message.sources[0].slug, "main-library");

        let history = service.history("u1", &reply.session_id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[1].role, MessageRole::Assistant);

        drop(tx);
        let mut forwarded = Vec::new();
        while let Some(chunk) = rx.recv().await {
            forwarded.push(chunk);
        }
        assert_eq!(forwarded.len(), 4);
        assert_eq!(forwarded.last(), Some(&StreamChunk::Done));
    }

    #[tokio::test]
    async fn test_history_is_sent_on_follow_up() {
        let backend = ScriptedBackend::new(HAPPY_BODY);
        let service = service(backend.clone(), 10);
        let cancel = CancellationToken::new();

        let first = service
            .send_message("u1", None, "first", &cancel, None)
            .await
            .unwrap();
        service
            .send_message("u1", Some(&first.session_id), "second", &cancel, None)
            .await
            .unwrap();

        let requests = backend.requests.lock();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].history.is_empty());
        assert_eq!(requests[1].history.len(), 2);
        assert_eq!(requests[1].history[0].content, "first");
        assert_eq!(requests[1].history[1].role, "assistant");
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let service = service(ScriptedBackend::new(HAPPY_BODY), 1);
        let cancel = CancellationToken::new();

        service
            .send_message("u1", None, "one", &cancel, None)
            .await
            .unwrap();
        let err = service
            .send_message("u1", None, "two", &cancel, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::RateLimited { wait_ms } if wait_ms > 0));

        // Other users are unaffected
        assert!(service
            .send_message("u2", None, "hi", &cancel, None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_error_chunk_is_surfaced() {
        let backend = ScriptedBackend::new(concat!(
            "data: {\"type\":\"content\",\"data\":\"partial\"}\n\n",
            "data: {\"type\":\"error\",\"data\":\"model unavailable\"}\n\n",
        ));
        let service = service(backend, 10);
        let cancel = CancellationToken::new();

        let err = service
            .send_message("u1", None, "hi", &cancel, None)
            .await
            .unwrap_err();
        match err {
            ChatError::Remote(message) => assert_eq!(message, "model unavailable"),
            other => panic!("unexpected error: {:?}", other),
        }

        // Only the user message was stored
        let sessions = service.list_sessions("u1").unwrap();
        assert_eq!(service.history("u1", &sessions[0].id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_closed_without_done() {
        let backend = ScriptedBackend::new("data: {\"type\":\"content\",\"data\":\"cut\"}\n\n");
        let service = service(backend, 10);
        let cancel = CancellationToken::new();

        let err = service
            .send_message("u1", None, "hi", &cancel, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::StreamClosed));
    }

    #[tokio::test]
    async fn test_malformed_record_is_skipped() {
        let backend = ScriptedBackend::new(concat!(
            "data: {\"type\":\"content\",\"data\":\"ok\"}\n\n",
            "data: {oops\n\n",
            "data: {\"type\":\"done\",\"data\":null}\n\n",
        ));
        let service = service(backend, 10);
        let cancel = CancellationToken::new();

        let reply = service
            .send_message("u1", None, "hi", &cancel, None)
            .await
            .unwrap();
        assert_eq!(reply.message.content, "ok");
    }

    #[tokio::test]
    async fn test_cancellation_stops_stalled_stream() {
        let service = service(Arc::new(StalledBackend), 10);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = service
            .send_message("u1", None, "hi", &cancel, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Cancelled));
    }

    #[tokio::test]
    async fn test_other_users_sessions_are_hidden() {
        let service = service(ScriptedBackend::new(HAPPY_BODY), 10);
        let cancel = CancellationToken::new();
        let reply = service
            .send_message("u1", None, "mine", &cancel, None)
            .await
            .unwrap();

        assert!(matches!(
            service.history("u2", &reply.session_id),
            Err(ChatError::SessionNotFound(_))
        ));
        assert!(service.delete_session("u2", &reply.session_id).is_err());
        service.delete_session("u1", &reply.session_id).unwrap();
        assert!(service.list_sessions("u1").unwrap().is_empty());
    }
}
