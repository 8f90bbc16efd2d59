use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use serde_json::Map;

use taskstore::cli::{Cli, Command};
use taskstore::{DynamicRecord, Store};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;
    let cli = Cli::parse();
    info!(store = %cli.store.display(), "taskstore starting");

    let store: Store<DynamicRecord> = Store::open(&cli.store)?;

    match cli.command {
        Command::Put { id, kind, fields } => {
            let fields: Map<String, serde_json::Value> =
                serde_json::from_str(&fields).context("fields must be a JSON object")?;
            store.put(DynamicRecord { id: id.clone(), kind, fields })?;
            println!("{} put {}", "✓".green(), id.cyan());
        }
        Command::Get { id } => match store.get(&id) {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => println!("{} no record with id {}", "✗".red(), id),
        },
        Command::Delete { id } => {
            store.delete(&id)?;
            println!("{} deleted {}", "✓".green(), id.cyan());
        }
        Command::List => {
            for record in store.all() {
                println!("{}\t{}", record.id.cyan(), record.kind);
            }
        }
        Command::Compact => {
            store.compact()?;
            println!("{} compacted log ({} records)", "✓".green(), store.len());
        }
    }

    Ok(())
}
