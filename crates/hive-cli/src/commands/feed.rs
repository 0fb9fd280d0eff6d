//! `hive feed` - rank forum posts offline

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use hive_core::forum::{rank_posts, FeedPost, FeedSort};

#[derive(Subcommand)]
pub enum FeedCommand {
    /// Sort a JSON list of posts the way the feed does
    Rank {
        /// JSON file with posts, or `-` for stdin
        file: PathBuf,
        /// hot, new or top
        #[arg(long, default_value_t = FeedSort::Hot)]
        sort: FeedSort,
        /// Print the ranked posts as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: FeedCommand) -> Result<()> {
    match command {
        FeedCommand::Rank { file, sort, json } => {
            let mut posts: Vec<FeedPost> = super::read_json(&file)?;
            rank_posts(&mut posts, sort);
            if json {
                println!("{}", serde_json::to_string_pretty(&posts)?);
            } else {
                for post in &posts {
                    println!("{}", format_post(post));
                }
            }
            Ok(())
        }
    }
}

fn format_post(post: &FeedPost) -> String {
    format!(
        "{:>5}  {}  {} ({} comments)",
        post.score,
        post.created_at.format("%Y-%m-%d %H:%M"),
        post.title,
        post.comment_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_post() {
        let post = FeedPost {
            id: "p1".to_string(),
            subforum_id: "s1".to_string(),
            author_id: "u1".to_string(),
            title: "Lost umbrella".to_string(),
            body: String::new(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            score: 12,
            comment_count: 3,
        };
        assert_eq!(
            format_post(&post),
            "   12  2024-03-01 09:30  Lost umbrella (3 comments)"
        );
    }
}
