//! `hive game` - daily puzzle helpers

use anyhow::{anyhow, Result};
use clap::Subcommand;
use std::path::PathBuf;

use hive_core::game::{daily_puzzle_index, GameScore, Leaderboard, LeaderboardRow};

#[derive(Subcommand)]
pub enum GameCommand {
    /// Rank a JSON list of submitted scores
    Leaderboard {
        /// JSON file with scores, or `-` for stdin
        file: PathBuf,
        /// Only show the first N rows
        #[arg(long)]
        top: Option<usize>,
        /// Highlight this user's row
        #[arg(long)]
        user: Option<String>,
    },
    /// Print today's puzzle index for a pool of the given size
    Today {
        #[arg(long)]
        pool: usize,
    },
}

pub fn run(command: GameCommand) -> Result<()> {
    match command {
        GameCommand::Leaderboard { file, top, user } => {
            let scores: Vec<GameScore> = super::read_json(&file)?;
            let board = Leaderboard::build(&scores);
            let rows = match top {
                Some(n) => board.top(n),
                None => &board.rows[..],
            };
            for row in rows {
                println!("{}", format_row(row));
            }
            if let Some(user) = user {
                match board.position_of(&user) {
                    Some(row) => println!("\nYou: {}", format_row(row)),
                    None => println!("\nNo score for {} today", user),
                }
            }
            Ok(())
        }
        GameCommand::Today { pool } => {
            let today = chrono::Local::now().date_naive();
            let index = daily_puzzle_index(today, pool)
                .ok_or_else(|| anyhow!("Puzzle pool must not be empty"))?;
            println!("{}", index);
            Ok(())
        }
    }
}

fn format_row(row: &LeaderboardRow) -> String {
    format!(
        "{:>3}. {:<20} {:>6}  {:.1}s",
        row.rank,
        row.display_name,
        row.score,
        row.time_ms as f64 / 1000.0
    )
}
