//! Chat API client
//!
//! Opens response streams against the remote chat assistant.

mod core;
mod error;
mod stream;

pub use self::core::ChatClient;
pub use error::ChatError;
pub use stream::{ChatBackend, ChatRequest, HistoryMessage};
