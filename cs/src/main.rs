use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use contextstore::cli::{Cli, Command};
use contextstore::config::Config;
use contextstore::{ContextStore, PlanningInsight};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("contextstore starting");

    let store = ContextStore::open_with_limit(&config.store_path, config.max_cached_contexts)?;

    match cli.command {
        Command::RegisterAgent { project_id, agent_id, task_id, agent_type } => {
            store.register_agent(&project_id, &agent_id, &task_id, &agent_type)?;
            println!("{} Registered {} on {}", "✓".green(), agent_id.cyan(), project_id.cyan());
        }
        Command::SetFilesHint { project_id, agent_id, files } => {
            store.set_files_hint(&project_id, &agent_id, files)?;
            println!("{} Updated files hint for {}", "✓".green(), agent_id.cyan());
        }
        Command::UnregisterAgent { project_id, agent_id, task_id, agent_type, success, duration_seconds } => {
            let insight = PlanningInsight {
                task_id,
                agent_type,
                timestamp: taskstore::now_ms(),
                success,
                duration_seconds,
                step_count: 0,
                completed_steps: 0,
                total_iterations: 0,
                files_modified: Vec::new(),
                files_created: Vec::new(),
                error_message: None,
            };
            store.unregister_agent(&project_id, &agent_id, insight)?;
            println!("{} Unregistered {} from {}", "✓".green(), agent_id.cyan(), project_id.cyan());
        }
        Command::IsFileInUse { project_id, file } => {
            let in_use = store.is_file_in_use(&project_id, &file)?;
            println!("{in_use}");
        }
        Command::FilesInUse { project_id } => {
            for file in store.files_in_use(&project_id)? {
                println!("{file}");
            }
        }
        Command::Stats { project_id } => {
            let stats = store.project_statistics(&project_id)?;
            println!("Project: {}", project_id.cyan());
            println!("  Tasks recorded: {}", stats.task_count);
            println!("  Success rate: {:.1}%", stats.success_rate * 100.0);
            println!("  Avg duration: {:.2}s", stats.avg_duration_seconds);
            println!("  Avg steps: {:.1}", stats.avg_step_count);
            println!("  Avg iterations: {:.1}", stats.avg_iterations);
        }
        Command::List => {
            let ids = store.cached_project_ids();
            if ids.is_empty() {
                println!("No cached projects");
            } else {
                for id in ids {
                    println!("{id}");
                }
            }
        }
    }

    store.persist_all()?;
    Ok(())
}
