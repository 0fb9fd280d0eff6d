//! Hive core library
//!
//! Backend building blocks for the campus community app:
//! - `ai` - chat assistant streaming, retry and API client
//! - `ratelimit` - per-user sliding window limiter
//! - `chat` - chat sessions, history and the send flow
//! - `forum` - subforums, posts, votes, comments and feeds
//! - `events` - calendar export
//! - `game` - daily puzzle and leaderboard
//! - `storage` - SQLite database and migrations
//! - `config` / `paths` - configuration and file locations

pub mod ai;
pub mod chat;
pub mod config;
pub mod events;
pub mod forum;
pub mod game;
pub mod paths;
pub mod ratelimit;
pub mod storage;

pub use config::HiveConfig;
