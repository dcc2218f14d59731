//! Agenda CLI - operator commands for the item store and calendar sync
//!
//! Adds scheduled items, runs reconciliation passes against the calendar
//! provider and lets the operator review and resolve conflicts.

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands, ConflictCommands};
use crate::commands::add::run_add;
use crate::commands::common::resolve_db_path;
use crate::commands::conflicts::{run_conflicts_list, run_conflicts_resolve};
use crate::commands::digest::run_digest;
use crate::commands::ingest::run_ingest;
use crate::commands::list::run_list;
use crate::commands::reconcile::run_reconcile;
use crate::commands::reset::run_reset;
use crate::commands::status::run_status;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("agenda=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Add {
            title,
            at,
            duration,
            description,
        } => run_add(&title, at.as_deref(), duration, description, &db_path)?,
        Commands::List { limit, json } => run_list(limit, json, &db_path)?,
        Commands::Status { id, json } => run_status(&id, json, &db_path)?,
        Commands::Reconcile { limit, json } => run_reconcile(limit, json, &db_path).await?,
        Commands::Conflicts { command } => match command {
            ConflictCommands::List {
                source,
                all,
                limit,
                json,
            } => run_conflicts_list(source.map(Into::into), all, limit, json, &db_path)?,
            ConflictCommands::Resolve { id, resolution } => {
                run_conflicts_resolve(&id, resolution.into(), &db_path).await?;
            }
        },
        Commands::Ingest { id, patch, row_ref } => {
            run_ingest(&id, &patch, row_ref.as_deref(), &db_path)?;
        }
        Commands::Reset { id } => run_reset(&id, &db_path)?,
        Commands::Digest { json } => run_digest(json, &db_path)?,
    }

    Ok(())
}
