//! `hive chat` - talk to the campus assistant

use anyhow::Result;
use clap::Subcommand;
use std::io::Write;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use hive_core::ai::StreamChunk;
use hive_core::chat::ChatService;
use hive_core::HiveConfig;

#[derive(Subcommand)]
pub enum ChatCommand {
    /// Send a message and stream the reply
    Send {
        /// Continue an existing session
        #[arg(long)]
        session: Option<String>,
        /// Message text
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// List your sessions
    Sessions,
    /// Show a session's messages
    History { session: String },
    /// Rename a session
    Rename { session: String, title: String },
    /// Delete a session and its messages
    Delete { session: String },
}

pub async fn run(command: ChatCommand, config: &HiveConfig, user: &str) -> Result<()> {
    let service = ChatService::from_config(config)?;

    match command {
        ChatCommand::Send { session, message } => {
            send(&service, user, session.as_deref(), &message.join(" ")).await
        }
        ChatCommand::Sessions => {
            for session in service.list_sessions(user)? {
                println!(
                    "{}  {}  {}",
                    session.id,
                    session.updated_at.format("%Y-%m-%d %H:%M"),
                    session.title.as_deref().unwrap_or("(untitled)")
                );
            }
            Ok(())
        }
        ChatCommand::History { session } => {
            for message in service.history(user, &session)? {
                println!("[{}] {}", message.role, message.content);
                for source in &message.sources {
                    println!("    - {} ({}/{})", source.title, source.category, source.slug);
                }
            }
            Ok(())
        }
        ChatCommand::Rename { session, title } => {
            service.rename_session(user, &session, &title)?;
            Ok(())
        }
        ChatCommand::Delete { session } => {
            service.delete_session(user, &session)?;
            println!("Deleted {}", session);
            Ok(())
        }
    }
}

async fn send(service: &ChatService, user: &str, session: Option<&str>, text: &str) -> Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<StreamChunk>();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(chunk) = rx.recv().await {
            if let StreamChunk::Content(delta) = chunk {
                let _ = write!(stdout, "{}", delta);
                let _ = stdout.flush();
            }
        }
    });

    let result = service
        .send_message(user, session, text, &cancel, Some(&tx))
        .await;
    drop(tx);
    let _ = printer.await;
    println!();

    let reply = result?;
    if !reply.message.sources.is_empty() {
        println!("\nSources:");
        for source in &reply.message.sources {
            println!("  - {} ({}/{})", source.title, source.category, source.slug);
        }
    }
    debug!("Reply stored in session {}", reply.session_id);
    eprintln!("session: {}", reply.session_id);
    Ok(())
}
