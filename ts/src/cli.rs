//! CLI argument parsing for the `taskstore` inspection/maintenance binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "taskstore")]
#[command(author, version, about = "Generic persistent record store", long_about = None)]
pub struct Cli {
    /// Store directory
    #[arg(short, long, default_value = ".taskstore")]
    pub store: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Insert or replace a record from a JSON document on stdin/arg
    Put {
        /// Record id
        id: String,
        /// Record kind
        kind: String,
        /// JSON object of scalar fields
        #[arg(default_value = "{}")]
        fields: String,
    },
    /// Print a record by id
    Get { id: String },
    /// Delete a record by id
    Delete { id: String },
    /// List every record
    List,
    /// Rewrite the append log from the current in-memory state
    Compact,
}
