//! Chat session and message CRUD operations

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ai::streaming::Source;
use crate::storage::{parse_timestamp, timestamp};

/// Maximum characters of the first message used as a session title
const TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub sources: Vec<Source>,
    pub created_at: DateTime<Utc>,
}

/// Store for chat session CRUD operations
pub struct SessionStore<'a> {
    conn: &'a Connection,
}

impl<'a> SessionStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a session for a user
    pub fn create(&self, user_id: &str, title: Option<&str>) -> Result<ChatSession> {
        let now = Utc::now();
        let session = ChatSession {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO chat_sessions (id, user_id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                session.id,
                session.user_id,
                session.title,
                timestamp(&now)
            ],
        )?;

        debug!("Created chat session {} for {}", session.id, user_id);
        Ok(session)
    }

    /// Get a session by ID
    pub fn get(&self, id: &str) -> Result<Option<ChatSession>> {
        self.conn
            .query_row(
                "SELECT id, user_id, title, created_at, updated_at FROM chat_sessions WHERE id = ?1",
                [id],
                session_from_row,
            )
            .optional()
            .context("Failed to load chat session")
    }

    /// Sessions for a user, most recently active first
    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<ChatSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, title, created_at, updated_at FROM chat_sessions
             WHERE user_id = ?1 ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map([user_id], session_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list chat sessions")
    }

    /// Rename a session. Returns false if it does not exist.
    pub fn rename(&self, id: &str, title: &str) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE chat_sessions SET title = ?1, updated_at = ?2 WHERE id = ?3",
            params![title, timestamp(&Utc::now()), id],
        )?;
        Ok(updated > 0)
    }

    /// Delete a session and its messages. Returns false if it did not exist.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM chat_sessions WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    /// Append a message and bump the session's activity time
    ///
    /// An untitled session takes its title from the first user message.
    pub fn add_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
        sources: &[Source],
    ) -> Result<ChatMessage> {
        let now = Utc::now();
        let sources_json =
            serde_json::to_string(sources).context("Failed to serialize sources")?;

        let tx = self.conn.unchecked_transaction()?;
        let inserted = tx.execute(
            "INSERT INTO chat_messages (session_id, role, content, sources, created_at)
             SELECT ?1, ?2, ?3, ?4, ?5 WHERE EXISTS (SELECT 1 FROM chat_sessions WHERE id = ?1)",
            params![session_id, role.as_str(), content, sources_json, timestamp(&now)],
        )?;
        if inserted == 0 {
            return Err(anyhow!("Chat session not found: {}", session_id));
        }
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE chat_sessions SET updated_at = ?1 WHERE id = ?2",
            params![timestamp(&now), session_id],
        )?;
        if role == MessageRole::User {
            tx.execute(
                "UPDATE chat_sessions SET title = ?1 WHERE id = ?2 AND title IS NULL",
                params![title_from_message(content), session_id],
            )?;
        }
        tx.commit().context("Failed to commit chat message")?;

        Ok(ChatMessage {
            id,
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            sources: sources.to_vec(),
            created_at: now,
        })
    }

    /// Messages of a session in the order they were added
    pub fn messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, role, content, sources, created_at FROM chat_messages
             WHERE session_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map([session_id], |row| {
            let id: i64 = row.get(0)?;
            let session_id: String = row.get(1)?;
            let role: String = row.get(2)?;
            let content: String = row.get(3)?;
            let sources: String = row.get(4)?;
            let created_at: String = row.get(5)?;
            Ok((id, session_id, role, content, sources, created_at))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, session_id, role, content, sources, created_at) = row?;
            let role = MessageRole::parse(&role)
                .ok_or_else(|| anyhow!("Unknown message role in database: {}", role))?;
            let sources: Vec<Source> = serde_json::from_str(&sources)
                .with_context(|| format!("Corrupt sources on chat message {}", id))?;

            messages.push(ChatMessage {
                id,
                session_id,
                role,
                content,
                sources,
                created_at: parse_timestamp(&created_at),
            });
        }

        Ok(messages)
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ChatSession> {
    let created_at: String = row.get(3)?;
    let updated_at: String = row.get(4)?;
    Ok(ChatSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn title_from_message(content: &str) -> String {
    let trimmed = content.trim();
    match trimmed.char_indices().nth(TITLE_MAX_CHARS) {
        Some((idx, _)) => format!("{}...", trimmed[..idx].trim_end()),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    fn source(slug: &str) -> Source {
        Source {
            title: "Dining Halls".to_string(),
            slug: slug.to_string(),
            category: "campus-life".to_string(),
        }
    }

    #[test]
    fn test_create_and_get() {
        let db = Database::open_in_memory().unwrap();
        let store = SessionStore::new(db.conn());

        let session = store.create("u1", Some("Finals week")).unwrap();
        let loaded = store.get(&session.id).unwrap().unwrap();
        assert_eq!(loaded.user_id, "u1");
        assert_eq!(loaded.title.as_deref(), Some("Finals week"));
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_messages_round_trip_with_sources() {
        let db = Database::open_in_memory().unwrap();
        let store = SessionStore::new(db.conn());
        let session = store.create("u1", None).unwrap();

        store
            .add_message(&session.id, MessageRole::User, "Where can I eat?", &[])
            .unwrap();
        store
            .add_message(
                &session.id,
                MessageRole::Assistant,
                "Try the north dining hall.",
                &[source("dining-halls")],
            )
            .unwrap();

        let messages = store.messages(&session.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].sources[0].slug, "dining-halls");

        // Untitled session picks up the first user message as its title
        let loaded = store.get(&session.id).unwrap().unwrap();
        assert_eq!(loaded.title.as_deref(), Some("Where can I eat?"));
    }

    #[test]
    fn test_add_message_to_missing_session_fails() {
        let db = Database::open_in_memory().unwrap();
        let store = SessionStore::new(db.conn());
        assert!(store
            .add_message("nope", MessageRole::User, "hi", &[])
            .is_err());
    }

    #[test]
    fn test_failed_session_bump_leaves_no_message() {
        let db = Database::open_in_memory().unwrap();
        let store = SessionStore::new(db.conn());
        let session = store.create("u1", None).unwrap();

        db.conn()
            .execute_batch(
                "CREATE TRIGGER block_bump BEFORE UPDATE ON chat_sessions
                 BEGIN SELECT RAISE(ABORT, 'locked'); END;",
            )
            .unwrap();
        assert!(store
            .add_message(&session.id, MessageRole::User, "hello", &[])
            .is_err());

        db.conn().execute_batch("DROP TRIGGER block_bump").unwrap();
        assert!(store.messages(&session.id).unwrap().is_empty());
        assert!(store.get(&session.id).unwrap().unwrap().title.is_none());
    }

    #[test]
    fn test_corrupt_sources_are_reported() {
        let db = Database::open_in_memory().unwrap();
        let store = SessionStore::new(db.conn());
        let session = store.create("u1", None).unwrap();
        store
            .add_message(&session.id, MessageRole::Assistant, "hi", &[])
            .unwrap();

        db.conn()
            .execute("UPDATE chat_messages SET sources = 'not json'", [])
            .unwrap();
        assert!(store.messages(&session.id).is_err());
    }

    #[test]
    fn test_delete_cascades_messages() {
        let db = Database::open_in_memory().unwrap();
        let store = SessionStore::new(db.conn());
        let session = store.create("u1", None).unwrap();
        store
            .add_message(&session.id, MessageRole::User, "hello", &[])
            .unwrap();

        assert!(store.delete(&session.id).unwrap());
        assert!(!store.delete(&session.id).unwrap());
        assert!(store.messages(&session.id).unwrap().is_empty());
    }

    #[test]
    fn test_list_for_user_orders_by_activity() {
        let db = Database::open_in_memory().unwrap();
        let store = SessionStore::new(db.conn());
        let older = store.create("u1", Some("older")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newer = store.create("u1", Some("newer")).unwrap();
        store.create("u2", Some("someone else")).unwrap();

        let sessions = store.list_for_user("u1").unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, newer.id);

        std::thread::sleep(std::time::Duration::from_millis(2));
        store
            .add_message(&older.id, MessageRole::User, "bump", &[])
            .unwrap();
        let sessions = store.list_for_user("u1").unwrap();
        assert_eq!(sessions[0].id, older.id);
    }

    #[test]
    fn test_rename() {
        let db = Database::open_in_memory().unwrap();
        let store = SessionStore::new(db.conn());
        let session = store.create("u1", None).unwrap();
        assert!(store.rename(&session.id, "Housing").unwrap());
        assert!(!store.rename("missing", "x").unwrap());
        assert_eq!(
            store.get(&session.id).unwrap().unwrap().title.as_deref(),
            Some("Housing")
        );
    }

    #[test]
    fn test_title_truncates_on_char_boundary() {
        let long = "é".repeat(60);
        let title = title_from_message(&long);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
        assert!(title.ends_with("..."));
        assert_eq!(title_from_message("  short  "), "short");
    }
}
