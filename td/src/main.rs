//! forgecore daemon and CLI entry point (§4.14).
//!
//! `run` hosts the long-lived process in this one binary: the five
//! periodic workers, the Dragon session host, and the IPC listener. Every
//! other subcommand is a short-lived client that talks to a running daemon
//! over [`forgecore::ipc`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use forgecore::agent::{DragonEvent, DragonSession, ProjectRepository as DragonRepository};
use forgecore::cli::{Cli, Command, OutputFormat, ProjectCommand};
use forgecore::config::Config;
use forgecore::events::{PromptBroker, spawn_session_event_log};
use forgecore::ipc::{self, DaemonClient, DaemonMetrics, DaemonRequest, DaemonRequestHandler, DaemonResponse, ProjectSummary};
use forgecore::llm::ProviderGateway;
use forgecore::pipeline::Service;
use forgecore::scheduler::{Cycle, DrakeExecutionCycle, DrakeMonitoringCycle, KoboldRegistry, SchedulerConfig, SchedulerDaemon, VerificationCycle, WyrmCycle, WyvernCycle};
use forgecore::state::{self, PlanStore, ProjectRepository};
use forgecore::tools::ToolContext;
use forgecore::{Project, ProjectStatus};

fn init_logging(cli_log_level: Option<&str>) {
    let filter = cli_log_level
        .map(|level| EnvFilter::new(level))
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn project_summary(project: &Project) -> ProjectSummary {
    let (task_count, tasks_done) = state::task_counts(project);
    ProjectSummary { id: project.id.clone(), name: project.name.clone(), status: project.status.to_string(), task_count, tasks_done }
}

fn scheduler_config_from(config: &forgecore::config::SchedulerConfig) -> SchedulerConfig {
    let mut scheduler_config = SchedulerConfig::with_default_stagger();
    scheduler_config.set_interval(Service::Wyrm, Duration::from_secs(config.wyrm_interval_secs));
    scheduler_config.set_interval(Service::Wyvern, Duration::from_secs(config.wyvern_interval_secs));
    scheduler_config.set_interval(Service::DrakeExecution, Duration::from_secs(config.drake_execution_interval_secs));
    scheduler_config.set_interval(Service::DrakeMonitoring, Duration::from_secs(config.drake_monitoring_interval_secs));
    scheduler_config.set_interval(Service::Verification, Duration::from_secs(config.verification_interval_secs));
    if !config.stagger {
        for service in Service::ALL {
            scheduler_config.set_stagger(service, Duration::ZERO);
        }
    }
    scheduler_config
}

/// Backs the IPC listener's `DaemonRequestHandler`: the same project
/// repository and Kobold registry the scheduler drives, plus the prompt
/// broker's pending count for `status`.
struct Handler {
    repo: Arc<ProjectRepository>,
    kobolds: KoboldRegistry,
    prompts: Arc<PromptBroker>,
    shutdown_tx: watch::Sender<bool>,
}

impl Handler {
    async fn metrics(&self) -> DaemonMetrics {
        DaemonMetrics {
            active_kobolds: self.kobolds.total_working().await,
            active_drakes: self.kobolds.distinct_areas().await,
            pending_prompts: self.prompts.pending_count(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl DaemonRequestHandler for Handler {
    async fn handle(&self, request: DaemonRequest) -> DaemonResponse {
        match request {
            DaemonRequest::Ping => DaemonResponse::Pong { version: env!("CARGO_PKG_VERSION").to_string() },
            DaemonRequest::Status => DaemonResponse::Status(self.metrics().await),
            DaemonRequest::ProjectList => DaemonResponse::Projects(self.repo.all().iter().map(project_summary).collect()),
            DaemonRequest::ProjectShow { name } => match DragonRepository::find_by_name(self.repo.as_ref(), &name).await {
                Some(project) => DaemonResponse::Project(project_summary(&project)),
                None => DaemonResponse::Error { message: format!("no such project: {name}") },
            },
            DaemonRequest::Verify { name } => match DragonRepository::find_by_name(self.repo.as_ref(), &name).await {
                Some(project) => match DragonRepository::transition(self.repo.as_ref(), &project.id, ProjectStatus::AwaitingVerification).await {
                    Ok(()) => DaemonResponse::Ok,
                    Err(e) => DaemonResponse::Error { message: e.to_string() },
                },
                None => DaemonResponse::Error { message: format!("no such project: {name}") },
            },
            DaemonRequest::Shutdown => {
                let _ = self.shutdown_tx.send(true);
                DaemonResponse::Ok
            }
        }
    }
}

async fn run(config: Config) -> Result<()> {
    std::fs::create_dir_all(&config.storage.projects_dir).context("failed to create projects directory")?;
    let repo = Arc::new(ProjectRepository::open(&config.storage.projects_dir).context("failed to open project repository")?);
    let plans = Arc::new(PlanStore::open(config.storage.projects_dir.join(".plans")).context("failed to open plan store")?);
    let gateway = Arc::new(ProviderGateway::from_config(&config.llm).map_err(|e| eyre::eyre!(e.to_string())).context("failed to build provider gateway")?);
    let kobolds = KoboldRegistry::new();

    let scheduler_config = scheduler_config_from(&config.scheduler);
    let mut cycles: HashMap<Service, Arc<dyn Cycle>> = HashMap::new();
    cycles.insert(Service::Wyrm, Arc::new(WyrmCycle::new(repo.clone(), gateway.clone())));
    cycles.insert(Service::Wyvern, Arc::new(WyvernCycle::new(repo.clone(), gateway.clone())));
    cycles.insert(Service::DrakeExecution, Arc::new(DrakeExecutionCycle::new(repo.clone(), gateway.clone(), plans.clone(), kobolds.clone())));
    cycles.insert(Service::DrakeMonitoring, Arc::new(DrakeMonitoringCycle::new(repo.clone(), kobolds.clone())));
    cycles.insert(Service::Verification, Arc::new(VerificationCycle::new(repo.clone(), Duration::from_secs(config.verification.step_timeout_secs))));
    let scheduler_daemon = SchedulerDaemon::spawn(scheduler_config, cycles);
    info!("daemon: scheduler started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (dragon_tx, mut dragon_rx) = mpsc::unbounded_channel();
    let (log_tx, log_rx) = mpsc::unbounded_channel();
    let prompts = Arc::new(PromptBroker::new(dragon_tx.clone()));
    let session_id = forgecore::domain::generate_id("session");
    let runs_dir = config.storage.projects_dir.join(".runs");
    let event_log_handle = spawn_session_event_log(&runs_dir, session_id.clone(), log_rx).context("failed to start session event log")?;

    let mut console_shutdown = shutdown_rx.clone();
    let console_handle = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                event = dragon_rx.recv() => event,
                _ = console_shutdown.changed() => {
                    if *console_shutdown.borrow() { break } else { continue }
                }
            };
            let Some(event) = event else { break };
            match &event {
                DragonEvent::AssistantText(text) => println!("dragon: {text}"),
                DragonEvent::Prompt { question, .. } => println!("dragon asks: {question}"),
                DragonEvent::SpecificationCreated { project_id } => println!("dragon: specification created for {project_id}"),
                DragonEvent::Error(message) => warn!(%message, "dragon session error"),
                DragonEvent::ToolCall { .. } | DragonEvent::ToolResult { .. } => {}
            }
            if log_tx.send(event).is_err() {
                break;
            }
        }
    });

    let dragon_repo: Arc<dyn DragonRepository> = repo.clone();
    let dragon_session = DragonSession::new(gateway.as_ref(), dragon_repo, dragon_tx);
    let dragon_workspace = config.storage.projects_dir.join(".dragon-workspace");
    std::fs::create_dir_all(&dragon_workspace).context("failed to create dragon workspace")?;
    let dragon_ctx = ToolContext::new(dragon_workspace, session_id).with_user_prompter(prompts.clone());

    let socket_path = ipc::get_socket_path();
    let (listener, socket_path) = ipc::create_listener_at(&socket_path).context("failed to bind IPC socket")?;
    let handler = Handler { repo: repo.clone(), kobolds: kobolds.clone(), prompts: prompts.clone(), shutdown_tx: shutdown_tx.clone() };
    let ipc_handle = tokio::spawn(ipc::serve(listener, handler, shutdown_rx.clone()));

    info!(socket = %socket_path.display(), "daemon: ready, type a message and press enter (ctrl-c to stop)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shutdown_signal = shutdown_rx.clone();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(text)) if !text.trim().is_empty() => dragon_session.handle_message(text.trim(), &dragon_ctx).await,
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "daemon: failed to read stdin");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("daemon: received ctrl-c, shutting down");
                break;
            }
            _ = shutdown_signal.changed() => {
                if *shutdown_signal.borrow() {
                    info!("daemon: shutdown requested over ipc");
                    break;
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    scheduler_daemon.shutdown().await;
    let _ = ipc_handle.await;
    drop(dragon_session);
    let _ = console_handle.await;
    let _ = event_log_handle.await;
    ipc::cleanup_socket(&socket_path);
    Ok(())
}

fn print_metrics(metrics: &DaemonMetrics, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(metrics).unwrap_or_default()),
        OutputFormat::Text | OutputFormat::Table => {
            println!("active kobolds:  {}", metrics.active_kobolds);
            println!("active drakes:   {}", metrics.active_drakes);
            println!("pending prompts: {}", metrics.pending_prompts);
            println!("cycles run:      {}", metrics.cycles_run);
            println!("cycles skipped:  {}", metrics.cycles_skipped);
        }
    }
}

fn print_projects(projects: &[ProjectSummary], format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(projects).unwrap_or_default()),
        OutputFormat::Table => {
            println!("{:<24} {:<20} {:>10} {:>10}", "NAME", "STATUS", "TASKS", "DONE");
            for project in projects {
                println!("{:<24} {:<20} {:>10} {:>10}", project.name, project.status, project.task_count, project.tasks_done);
            }
        }
        OutputFormat::Text => {
            for project in projects {
                println!("{} ({}): {} - {}/{} tasks done", project.name, project.id, project.status, project.tasks_done, project.task_count);
            }
        }
    }
}

fn print_project(project: &ProjectSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(project).unwrap_or_default()),
        _ => print_projects(std::slice::from_ref(project), format),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run => run(config).await,
        Command::Status { format } => {
            let client = DaemonClient::new();
            let metrics = client.status().await.context("failed to reach the daemon - is `forgecore run` running?")?;
            print_metrics(&metrics, format);
            Ok(())
        }
        Command::Project { command: ProjectCommand::List { format } } => {
            let client = DaemonClient::new();
            let projects = client.project_list().await.context("failed to reach the daemon - is `forgecore run` running?")?;
            print_projects(&projects, format);
            Ok(())
        }
        Command::Project { command: ProjectCommand::Show { name, format } } => {
            let client = DaemonClient::new();
            let project = client.project_show(&name).await.context("failed to reach the daemon - is `forgecore run` running?")?;
            print_project(&project, format);
            Ok(())
        }
        Command::Verify { name } => {
            let client = DaemonClient::new();
            client.verify(&name).await.context("failed to reach the daemon - is `forgecore run` running?")?;
            println!("{name}: queued for verification");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_honors_explicit_intervals() {
        let config = forgecore::config::SchedulerConfig { wyrm_interval_secs: 5, stagger: false, ..Default::default() };
        let scheduler_config = scheduler_config_from(&config);
        assert_eq!(scheduler_config.for_service(Service::Wyrm).interval, Duration::from_secs(5));
        assert_eq!(scheduler_config.for_service(Service::Wyrm).stagger, Duration::ZERO);
    }

    #[test]
    fn project_summary_reports_zero_tasks_before_analysis() {
        let project = Project::new("demo", "/tmp/demo-root");
        let summary = project_summary(&project);
        assert_eq!(summary.task_count, 0);
        assert_eq!(summary.tasks_done, 0);
    }
}
