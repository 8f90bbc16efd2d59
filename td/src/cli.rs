//! CLI command definitions (§4.14): a thin `clap`-derived surface around
//! the core library. Contains no business logic beyond argument parsing
//! and pretty-printing - `run` starts the daemon in-process, every other
//! subcommand talks to a running daemon over [`crate::ipc`].

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "forgecore", about = "Autonomous multi-agent orchestration core", version)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the daemon: periodic workers, the Dragon session host, and the IPC listener.
    Run,

    /// Print daemon metrics.
    Status {
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Inspect registered projects.
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },

    /// Force a verification cycle for a project outside its timer.
    Verify {
        /// Project name
        name: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProjectCommand {
    /// List all registered projects.
    List {
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
    /// Show one project's detail.
    Show {
        name: String,
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for status/project commands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => Err(format!("unknown format: {s}. use: text, json, or table")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::Table => write!(f, "table"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run() {
        let cli = Cli::parse_from(["forgecore", "run"]);
        assert!(matches!(cli.command, Command::Run));
    }

    #[test]
    fn parses_status_with_format() {
        let cli = Cli::parse_from(["forgecore", "status", "-f", "json"]);
        assert!(matches!(cli.command, Command::Status { format: OutputFormat::Json }));
    }

    #[test]
    fn parses_project_show() {
        let cli = Cli::parse_from(["forgecore", "project", "show", "my-app"]);
        match cli.command {
            Command::Project { command: ProjectCommand::Show { name, format } } => {
                assert_eq!(name, "my-app");
                assert_eq!(format, OutputFormat::Text);
            }
            other => panic!("expected Project::Show, got {other:?}"),
        }
    }

    #[test]
    fn parses_verify() {
        let cli = Cli::parse_from(["forgecore", "verify", "my-app"]);
        assert!(matches!(cli.command, Command::Verify { name } if name == "my-app"));
    }

    #[test]
    fn output_format_roundtrips_through_str() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("TABLE".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn global_config_flag_is_accepted_before_subcommand() {
        let cli = Cli::parse_from(["forgecore", "-c", "/path/to/config.yml", "run"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
    }
}
