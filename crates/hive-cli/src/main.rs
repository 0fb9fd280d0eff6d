//! Hive - campus community command line

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hive_core::HiveConfig;

/// Environment variable holding the log filter
const LOG_ENV: &str = "HIVE_LOG";

#[derive(Parser)]
#[command(name = "hive", version, about = "Campus community tools")]
struct Cli {
    /// Path to config file (defaults to ~/.config/hive/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// User identity for rate limiting and session ownership (defaults to $USER)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Talk to the campus assistant
    Chat {
        #[command(subcommand)]
        command: commands::chat::ChatCommand,
    },
    /// Export events as an iCalendar file
    Events {
        #[command(subcommand)]
        command: commands::events::EventsCommand,
    },
    /// Rank forum posts
    Feed {
        #[command(subcommand)]
        command: commands::feed::FeedCommand,
    },
    /// Daily game utilities
    Game {
        #[command(subcommand)]
        command: commands::game::GameCommand,
    },
    /// Print the effective configuration
    Config,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    // Logs go to stderr so streamed replies on stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<HiveConfig> {
    match path {
        Some(path) => HiveConfig::load_from(path),
        None => HiveConfig::load(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_ref())?;
    let user = cli
        .user
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "anonymous".to_string());
    tracing::debug!("Running as user {}", user);

    match cli.command {
        Command::Chat { command } => commands::chat::run(command, &config, &user).await,
        Command::Events { command } => commands::events::run(command),
        Command::Feed { command } => commands::feed::run(command),
        Command::Game { command } => commands::game::run(command),
        Command::Config => {
            print!("{}", commands::config_toml(&config)?);
            Ok(())
        }
    }
}
