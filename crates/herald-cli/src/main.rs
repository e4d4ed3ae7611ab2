//! Herald - background push host
//!
//! Runs one unit of background work the way an OS extension would:
//! - `herald ack <chat-id>` handles a message push and acknowledges delivery
//! - `herald voip <payload>` admits an incoming VoIP push
//! - `herald bridge <method> [args]` answers a bridge call from the app
//!
//! Command results go to stdout as JSON; logs go to the container's log file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use herald_core::SharedContainer;

mod commands;
mod console;

/// Herald - background push host
#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "Background push host: acknowledgments, VoIP admission and bridge calls", long_about = None)]
struct Cli {
    /// Shared container directory (defaults to HERALD_CONTAINER_DIR, then the data dir)
    #[arg(long, global = true)]
    container: Option<PathBuf>,

    /// Time budget for background work, in seconds
    #[arg(long, global = true, default_value_t = 30)]
    budget_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle a message push for a chat and acknowledge its delivery
    Ack {
        chat_id: String,

        /// Notification identifier (defaults to the chat id)
        #[arg(long)]
        id: Option<String>,

        #[arg(long, default_value = "")]
        title: String,

        #[arg(long, default_value = "")]
        body: String,
    },

    /// Admit an incoming VoIP push
    ///
    /// The payload is a JSON object read from a file, or from stdin with `-`.
    Voip { payload: String },

    /// Answer a bridge method call
    Bridge {
        method: String,

        /// JSON arguments
        #[arg(default_value = "null")]
        args: String,
    },
}

fn init_logging(container: &SharedContainer) -> Result<()> {
    let log_dir = container.logs_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory: {}", e);
    }

    #[cfg(unix)]
    let null_device = "/dev/null";
    #[cfg(windows)]
    let null_device = "NUL";

    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("herald.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "Failed to create log file: {}, falling back to null device",
                e
            );
            std::fs::File::create(null_device)?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let container = SharedContainer::resolve(cli.container.as_deref());
    init_logging(&container)?;

    let budget = Duration::from_secs(cli.budget_secs);
    tracing::info!(container = %container.root().display(), ?budget, "Herald starting");

    let output = match cli.command {
        Commands::Ack {
            chat_id,
            id,
            title,
            body,
        } => commands::ack(container, budget, &chat_id, id, title, body).await?,
        Commands::Voip { payload } => {
            let raw = commands::read_payload(&payload)?;
            commands::voip(container, budget, &raw).await?
        }
        Commands::Bridge { method, args } => commands::bridge(container, &method, &args)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
