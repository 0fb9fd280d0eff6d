//! Forums: subforums, posts, votes, comments and feed ranking

pub mod ranking;
pub mod store;

pub use ranking::{rank_posts, FeedPost, FeedSort};
pub use store::{Comment, ForumStore, Subforum};
