//! `hive events` - calendar export

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::PathBuf;
use tracing::info;

use hive_core::events::{CalendarEvent, IcsCalendar};

#[derive(Subcommand)]
pub enum EventsCommand {
    /// Convert a JSON list of events into an .ics file
    Export {
        /// JSON file with events, or `-` for stdin
        file: PathBuf,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Calendar name shown by calendar apps
        #[arg(long, default_value = "Hive Events")]
        name: String,
    },
}

pub fn run(command: EventsCommand) -> Result<()> {
    match command {
        EventsCommand::Export { file, output, name } => {
            let events: Vec<CalendarEvent> = super::read_json(&file)?;
            let ics = IcsCalendar::new(name).render(&events);
            match output {
                Some(path) => {
                    std::fs::write(&path, ics)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    info!("Wrote {} events to {:?}", events.len(), path);
                }
                None => print!("{}", ics),
            }
            Ok(())
        }
    }
}
