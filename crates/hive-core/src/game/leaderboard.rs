//! Daily puzzle selection and leaderboard ranking

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Day zero of the puzzle rotation
const EPOCH: (i32, u32, u32) = (2024, 1, 1);

/// Index into the puzzle pool for a calendar day
///
/// Consecutive days walk the pool in order and wrap around. Returns `None`
/// for an empty pool.
pub fn daily_puzzle_index(date: NaiveDate, pool_len: usize) -> Option<usize> {
    if pool_len == 0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(EPOCH.0, EPOCH.1, EPOCH.2)?;
    let days = date.signed_duration_since(epoch).num_days();
    Some(days.rem_euclid(pool_len as i64) as usize)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameScore {
    pub user_id: String,
    pub display_name: String,
    pub score: i64,
    /// Time taken to finish, lower is better
    pub time_ms: u64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub user_id: String,
    pub display_name: String,
    pub score: i64,
    pub time_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Leaderboard {
    pub rows: Vec<LeaderboardRow>,
}

/// Higher score, then faster time, then earlier submission
fn compare(a: &GameScore, b: &GameScore) -> Ordering {
    b.score
        .cmp(&a.score)
        .then(a.time_ms.cmp(&b.time_ms))
        .then(a.submitted_at.cmp(&b.submitted_at))
}

impl Leaderboard {
    /// Rank each user's best submission
    ///
    /// Equal score and time share a rank, and the next rank skips ahead
    /// (1, 2, 2, 4).
    pub fn build(scores: &[GameScore]) -> Self {
        let mut best: HashMap<&str, &GameScore> = HashMap::new();
        for score in scores {
            best.entry(score.user_id.as_str())
                .and_modify(|current| {
                    if compare(score, *current) == Ordering::Less {
                        *current = score;
                    }
                })
                .or_insert(score);
        }

        let mut entries: Vec<&GameScore> = best.into_values().collect();
        entries.sort_by(|a, b| compare(a, b).then_with(|| a.user_id.cmp(&b.user_id)));

        let mut rows: Vec<LeaderboardRow> = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let rank = match rows.last() {
                Some(prev) if prev.score == entry.score && prev.time_ms == entry.time_ms => {
                    prev.rank
                }
                _ => i + 1,
            };
            rows.push(LeaderboardRow {
                rank,
                user_id: entry.user_id.clone(),
                display_name: entry.display_name.clone(),
                score: entry.score,
                time_ms: entry.time_ms,
            });
        }

        Self { rows }
    }

    pub fn top(&self, n: usize) -> &[LeaderboardRow] {
        &self.rows[..n.min(self.rows.len())]
    }

    pub fn position_of(&self, user_id: &str) -> Option<&LeaderboardRow> {
        self.rows.iter().find(|row| row.user_id == user_id)
    }
}
