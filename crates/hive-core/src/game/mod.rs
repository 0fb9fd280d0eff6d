//! Daily game and leaderboard

pub mod leaderboard;

pub use leaderboard::{daily_puzzle_index, GameScore, Leaderboard, LeaderboardRow};
