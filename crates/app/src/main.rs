//! FieldSync - offline write queue CLI
//!
//! ## Usage
//!
//! ```bash
//! # Submit a write (queued when the backend is unreachable)
//! fieldsync submit complete_task '{"taskId": "t-1"}'
//!
//! # Queue summary
//! fieldsync status
//!
//! # Failed entries in one module
//! fieldsync list --status failed --module inventory
//!
//! # Retry everything now, including failed entries
//! fieldsync flush
//!
//! # Remove a failed entry
//! fieldsync dismiss <id>
//!
//! # Keep syncing in the background until Ctrl-C
//! fieldsync run
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fieldsync_app::{commands, AppContext, FlushOutcome};
use fieldsync_core::SubmitOutcome;
use fieldsync_domain::{Notification, WriteStatus};
use fieldsync_infra::config;
use fieldsync_infra::observability::init_tracing;

/// FieldSync - offline-first write queue
#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(version)]
#[command(about = "Queue writes while offline and replay them when the backend is reachable")]
struct Cli {
    /// Config file (TOML or JSON); probed from the working directory if unset
    #[arg(short, long, global = true, env = "FIELDSYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a write for a registered operation type
    Submit {
        operation_type: String,
        /// JSON payload
        payload: String,
        /// Number of line items, used in the "saved offline" message
        #[arg(long)]
        items: Option<u32>,
    },

    /// Show queue counts and connectivity
    Status,

    /// List queued entries in enqueue order
    List {
        /// queued, submitting or failed
        #[arg(long)]
        status: Option<WriteStatus>,
        #[arg(long)]
        module: Option<String>,
    },

    /// Drain the queue now, re-queueing failed entries
    Flush,

    /// Remove a failed entry
    Dismiss { id: String },

    /// Sync in the background until interrupted
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = config::load(cli.config).context("failed to load configuration")?;
    init_tracing(&config.logging);
    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) => tracing::debug!(error = %e, "no .env loaded"),
    }

    let mut ctx = AppContext::new(config).await.context("failed to initialize FieldSync")?;

    match cli.command {
        Commands::Submit { operation_type, payload, items } => {
            let payload = serde_json::from_str(&payload).context("payload is not valid JSON")?;
            let outcome = commands::submit(&ctx, &operation_type, payload, items).await?;
            print_submit_outcome(&outcome);
        }
        Commands::Status => {
            let report = commands::status(&ctx).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::List { status, module } => {
            for write in commands::list(&ctx, status, module).await? {
                println!("{}", serde_json::to_string(&write)?);
            }
        }
        Commands::Flush => match commands::flush(&ctx).await? {
            FlushOutcome::Offline => println!("backend unreachable; nothing sent"),
            FlushOutcome::Coalesced => println!("a sync is already running; it will run again"),
            FlushOutcome::OwnedElsewhere => {
                println!("another fieldsync process is syncing this queue; it will deliver")
            }
            FlushOutcome::Drained(report) => {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        },
        Commands::Dismiss { id } => {
            commands::dismiss(&ctx, &id).await?;
            println!("dismissed {id}");
        }
        Commands::Run => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for Ctrl-C");
                }
            };
            let metrics = commands::run(&mut ctx, shutdown, print_notification).await?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
    }

    Ok(())
}

fn print_submit_outcome(outcome: &SubmitOutcome) {
    match outcome {
        SubmitOutcome::Accepted { status, .. } => println!("accepted ({status})"),
        SubmitOutcome::Queued { id } => println!("queued {id}"),
        SubmitOutcome::Rejected { status, message } => println!("rejected ({status}): {message}"),
        SubmitOutcome::Conflict { kind, info } => {
            println!("conflict: {kind}");
            if let Some(message) = &info.message {
                println!("  {message}");
            }
        }
    }
}

fn print_notification(notification: &Notification) {
    println!("[{}] {}: {}", notification.level, notification.title, notification.description);
}
