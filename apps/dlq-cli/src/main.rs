//! Offline DLQ inspector: lists and shows dead-lettered records, and can
//! requeue one back onto the durable log for the running gateway to replay.
//! Never talks to the gateway process directly — it only reads/writes the
//! same on-disk files the gateway owns.

use anyhow::Result;
use clap::{Parser, Subcommand};
use gw_dlq::{read_all, DeadLetterEntry};
use gw_log::DurableLog;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Gateway dead-letter log inspector")]
struct Cli {
    /// Path to the dead-letter log file.
    #[arg(long, global = true, default_value = "data/dlq.log")]
    dlq_path: PathBuf,
    /// Path to the durable ingestion log, used by `requeue`.
    #[arg(long, global = true, default_value = "data/ingestion.log")]
    log_path: PathBuf,
    /// Emit JSON output instead of a table.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List dead-lettered records in append order.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one dead-lettered record by its message id.
    Show {
        #[arg()]
        id: String,
    },
    /// Requeue a dead-lettered record's payload onto the durable log.
    Requeue {
        #[arg()]
        id: String,
    },
}

#[derive(Serialize)]
struct ListRow<'a> {
    id: &'a str,
    from: &'a str,
    error: &'a str,
    dead_lettered_at: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let entries = read_all(&cli.dlq_path).await?;

    match cli.command {
        Commands::List { limit } => {
            let rows: Vec<_> = entries.iter().rev().take(limit).collect();
            if cli.json {
                let payload: Vec<_> = rows.iter().map(|e| list_row(e)).collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else if rows.is_empty() {
                println!("no dead-lettered records at {}", cli.dlq_path.display());
            } else {
                print_table(&rows);
            }
        }
        Commands::Show { id } => {
            let entry = find_entry(&entries, &id)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(entry)?);
            } else {
                println!("id             : {}", entry.record.payload.id);
                println!("from           : {}", entry.record.payload.from);
                println!("idempotencyKey : {}", entry.record.idempotency_key);
                println!("correlationId  : {}", entry.record.correlation_id);
                println!("error          : {}", entry.error);
                println!("deadLetteredAt : {}", entry.dead_lettered_at);
                println!("payload        : {}", serde_json::to_string_pretty(&entry.record.payload)?);
            }
        }
        Commands::Requeue { id } => {
            let entry = find_entry(&entries, &id)?.clone();
            let log = DurableLog::open(&cli.log_path).await?;
            log.append(&entry.record).await?;
            println!(
                "requeued {} onto {} for replay",
                entry.record.payload.id,
                cli.log_path.display()
            );
        }
    }

    Ok(())
}

fn find_entry<'a>(entries: &'a [DeadLetterEntry], id: &str) -> Result<&'a DeadLetterEntry> {
    entries
        .iter()
        .find(|entry| entry.record.payload.id == id)
        .ok_or_else(|| anyhow::anyhow!("no dead-lettered record with id {id:?}"))
}

fn list_row(entry: &DeadLetterEntry) -> ListRow<'_> {
    ListRow {
        id: &entry.record.payload.id,
        from: &entry.record.payload.from,
        error: &entry.error,
        dead_lettered_at: entry.dead_lettered_at,
    }
}

fn print_table(rows: &[&DeadLetterEntry]) {
    println!("{:<24} {:<24} {:<14} {:<40}", "ID", "FROM", "DEAD_LETTERED_AT", "ERROR");
    for entry in rows {
        println!(
            "{:<24} {:<24} {:<14} {:<40}",
            entry.record.payload.id, entry.record.payload.from, entry.dead_lettered_at, entry.error
        );
    }
}
