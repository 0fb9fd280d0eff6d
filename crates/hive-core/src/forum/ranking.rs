//! Feed sort orders

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::str::FromStr;

/// A post as shown in a feed, with its aggregated counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPost {
    pub id: String,
    pub subforum_id: String,
    pub author_id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// Sum of up (+1) and down (-1) votes
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub comment_count: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSort {
    #[default]
    Hot,
    New,
    Top,
}

impl FromStr for FeedSort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hot" => Ok(FeedSort::Hot),
            "new" => Ok(FeedSort::New),
            "top" => Ok(FeedSort::Top),
            other => Err(anyhow!("Unknown feed sort: {}", other)),
        }
    }
}

impl std::fmt::Display for FeedSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedSort::Hot => write!(f, "hot"),
            FeedSort::New => write!(f, "new"),
            FeedSort::Top => write!(f, "top"),
        }
    }
}

/// Sort posts in place for the given feed order
///
/// Hot is a placeholder: score first, newest first among equal scores. It
/// ignores age decay entirely.
pub fn rank_posts(posts: &mut [FeedPost], sort: FeedSort) {
    match sort {
        FeedSort::Hot => posts.sort_by_key(|p| (Reverse(p.score), Reverse(p.created_at))),
        FeedSort::New => posts.sort_by_key(|p| Reverse(p.created_at)),
        FeedSort::Top => posts.sort_by_key(|p| {
            (
                Reverse(p.score),
                Reverse(p.comment_count),
                Reverse(p.created_at),
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post(id: &str, score: i64, comments: i64, day: u32) -> FeedPost {
        FeedPost {
            id: id.to_string(),
            subforum_id: "cs".to_string(),
            author_id: "u".to_string(),
            title: id.to_string(),
            body: String::new(),
            created_at: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            score,
            comment_count: comments,
        }
    }

    fn ids(posts: &[FeedPost]) -> Vec<&str> {
        posts.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_hot_orders_by_votes_then_recency() {
        let mut posts = vec![
            post("old-popular", 10, 0, 1),
            post("new-quiet", 1, 0, 9),
            post("new-popular", 10, 0, 5),
        ];
        rank_posts(&mut posts, FeedSort::Hot);
        assert_eq!(ids(&posts), ["new-popular", "old-popular", "new-quiet"]);
    }

    #[test]
    fn test_new_ignores_votes() {
        let mut posts = vec![post("a", 50, 0, 1), post("b", -3, 0, 3), post("c", 0, 0, 2)];
        rank_posts(&mut posts, FeedSort::New);
        assert_eq!(ids(&posts), ["b", "c", "a"]);
    }

    #[test]
    fn test_top_breaks_ties_on_comments() {
        let mut posts = vec![post("a", 5, 1, 9), post("b", 5, 8, 1), post("c", 7, 0, 1)];
        rank_posts(&mut posts, FeedSort::Top);
        assert_eq!(ids(&posts), ["c", "b", "a"]);
    }

    #[test]
    fn test_parse_sort() {
        assert_eq!("HOT".parse::<FeedSort>().unwrap(), FeedSort::Hot);
        assert_eq!("new".parse::<FeedSort>().unwrap(), FeedSort::New);
        assert!("rising".parse::<FeedSort>().is_err());
        assert_eq!(FeedSort::Top.to_string(), "top");
    }
}
