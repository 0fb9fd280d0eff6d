//! Chat assistant sessions
//!
//! - `session` - session and message persistence
//! - `service` - rate-limited send/stream/persist flow

pub mod service;
pub mod session;

pub use service::{ChatReply, ChatService};
pub use session::{ChatMessage, ChatSession, MessageRole, SessionStore};
