//! workdb CLI: operator interface to a work store file.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use workdb::config::Config;
use workdb::progress::NoProgress;
use workdb::telemetry::{TelemetryConfig, init_telemetry};
use workdb::{RecordId, WorkStore};

#[derive(Parser)]
#[command(name = "workdb", about = "Persistent work-item store")]
struct Cli {
    /// Store file (overrides WORKDB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// TOML config file
    #[arg(long, global = true, conflicts_with = "db")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add every line of a JSONL file as an input
    Import {
        /// JSONL file, one input per line
        file: PathBuf,
    },
    /// Add a single input
    Add {
        /// Input as JSON
        input: String,
    },
    /// Remove records whose input duplicates an earlier one
    Dedup,
    /// Show record counts
    Stats,
    /// List incomplete records
    Pending {
        /// Maximum records to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Set the output of a record
    Complete {
        /// Record ID
        id: i64,
        /// Output as JSON
        output: String,
    },
    /// Export completed records to a JSONL file
    Export {
        /// Destination file (replaced)
        file: PathBuf,
        /// Rows fetched per batch (defaults to configured batch size)
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match (&cli.config, cli.db) {
        (Some(file), _) => Config::from_toml_file(file)?,
        (None, Some(path)) => Config::for_path(path)?,
        (None, None) => Config::from_env()?,
    };

    let _guard = init_telemetry(TelemetryConfig::from(&config))?;

    let mut store = WorkStore::open_with(&config.database_path, config.store_options())?;

    match cli.command {
        Command::Import { file } => cmd_import(&store, file)?,
        Command::Add { input } => cmd_add(&store, &input)?,
        Command::Dedup => cmd_dedup(&store)?,
        Command::Stats => cmd_stats(&store)?,
        Command::Pending { limit } => {
            store = store.with_progress(NoProgress);
            cmd_pending(&store, limit)?
        }
        Command::Complete { id, output } => cmd_complete(&store, RecordId(id), &output)?,
        Command::Export { file, batch_size } => {
            cmd_export(&store, file, batch_size.unwrap_or(config.batch_size))?
        }
    }

    store.close()?;
    Ok(())
}

fn cmd_import(store: &WorkStore, file: PathBuf) -> anyhow::Result<()> {
    let reader = BufReader::new(File::open(&file)?);
    let added = store.import_jsonl(reader)?;
    store.commit()?;
    println!("Imported {added} input(s) from {}", file.display());
    Ok(())
}

fn cmd_add(store: &WorkStore, input: &str) -> anyhow::Result<()> {
    let value: serde_json::Value = serde_json::from_str(input)?;
    let id = store.add(&value)?;
    store.commit()?;
    println!("Added: {id}");
    Ok(())
}

fn cmd_dedup(store: &WorkStore) -> anyhow::Result<()> {
    let removed = store.remove_duplicates()?;
    println!("Removed {removed} duplicate record(s)");
    Ok(())
}

fn cmd_stats(store: &WorkStore) -> anyhow::Result<()> {
    println!("Store:      {}", store.location());
    println!("Total:      {}", store.total_size()?);
    println!("Completed:  {}", store.completed_size()?);
    println!("Incomplete: {}", store.incomplete_size()?);
    Ok(())
}

fn cmd_pending(store: &WorkStore, limit: usize) -> anyhow::Result<()> {
    let mut shown = 0usize;
    let mut pending = store.incomplete()?;
    let remaining = pending.remaining();

    for item in pending.by_ref().take(limit) {
        let (id, input) = item?;
        println!("{id:<8}  {}", serde_json::to_string(&input)?);
        shown += 1;
    }
    pending.stop();

    if shown == 0 {
        println!("No incomplete records.");
    } else if remaining > shown {
        println!("\n{shown} of {remaining} incomplete record(s) shown");
    }
    Ok(())
}

fn cmd_complete(store: &WorkStore, id: RecordId, output: &str) -> anyhow::Result<()> {
    let value: serde_json::Value = serde_json::from_str(output)?;
    if !store.update(id, &value)? {
        anyhow::bail!("no record with id {id}");
    }
    store.commit()?;
    println!("Completed: {id}");
    Ok(())
}

fn cmd_export(store: &WorkStore, file: PathBuf, batch_size: usize) -> anyhow::Result<()> {
    let exported = store.write_jsonl(&file, batch_size)?;
    println!("Exported {exported} record(s) to {}", file.display());
    Ok(())
}
