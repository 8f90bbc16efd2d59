//! CLI argument parsing for contextstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cs")]
#[command(author, version, about = "Shared planning context store - per-project agent coordination state", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register an agent as active on a project's task.
    RegisterAgent {
        project_id: String,
        agent_id: String,
        task_id: String,
        agent_type: String,
    },

    /// Set the advisory files-hint for an already-registered agent.
    SetFilesHint {
        project_id: String,
        agent_id: String,
        /// File paths the agent's current plan step intends to touch.
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Remove an agent and record a completed-task insight for it.
    UnregisterAgent {
        project_id: String,
        agent_id: String,
        task_id: String,
        agent_type: String,
        /// Whether the task succeeded.
        #[arg(long)]
        success: bool,
        #[arg(long, default_value = "0")]
        duration_seconds: f64,
    },

    /// Check whether any active agent has a file hinted.
    IsFileInUse { project_id: String, file: String },

    /// List every file currently hinted by an active agent.
    FilesInUse { project_id: String },

    /// Show aggregate statistics derived from a project's insight history.
    Stats { project_id: String },

    /// List project ids currently held in the in-memory cache.
    List,
}
