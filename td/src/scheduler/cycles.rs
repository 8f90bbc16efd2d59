//! Concrete [`Cycle`] implementations (§4.6-§4.8) gluing the agent roles to
//! the project repository. Wyrm and Wyvern are simple one-shot-per-project
//! sweeps; Drake execution and monitoring share a [`KoboldRegistry`] since
//! Drakes themselves are never persisted - they're reconstructed every tick
//! from the task files on disk plus whatever Kobolds are still running from
//! a previous tick.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};

use crate::agent::{self, DrakeSupervisor, KoboldContext, ProjectRepository as ProjectRepositoryTrait};
use crate::domain::{Area, DrakeInfo, Kobold, KoboldStatus, Project, ProjectStatus, Task, TaskStatus};
use crate::llm::ProviderGateway;
use crate::pipeline::{self, Service};
use crate::state::{PlanStore, ProjectRepository, TaskFileStore, task_file};
use crate::tools::ToolContext;

use super::worker::Cycle;

fn area_task_file_path(project: &Project, area_name: &str) -> PathBuf {
    let slug = crate::domain::sanitize_name(area_name);
    Path::new(&project.paths.root).join("tasks").join(format!("{slug}-tasks.md"))
}

fn load_analysis(project: &Project) -> Option<crate::domain::WyvernAnalysis> {
    let content = std::fs::read_to_string(&project.paths.analysis_json).ok()?;
    serde_json::from_str(&content).ok()
}

fn load_wyrm_recommendation(project: &Project) -> Option<crate::domain::WyrmRecommendation> {
    let content = std::fs::read_to_string(&project.paths.wyrm_recommendation).ok()?;
    serde_json::from_str(&content).ok()
}

async fn save_project(repo: &ProjectRepository, project: &Project) {
    if let Err(e) = ProjectRepositoryTrait::save(repo, project).await {
        error!(project_id = %project.id, error = %e, "scheduler cycle: failed to persist project");
    }
}

/// Reconstructs the subset of `Task` fields Wyvern knows about (priority,
/// agent type, level, title-derived id) so `TaskFileStore::load` can
/// reconcile a hand-edited markdown row against them.
fn materialize_known(area: &Area, spec_version_id: &str) -> Vec<Task> {
    area.tasks
        .iter()
        .enumerate()
        .map(|(index, analyzed)| {
            let index_str = index.to_string();
            let id = crate::domain::short_slug(&[&area.name, &index_str, &analyzed.title]);
            let mut task = Task::new(id, analyzed.description.clone(), spec_version_id);
            task.priority = analyzed.priority;
            task.assigned_agent_type = analyzed.agent_type.clone();
            task.level = analyzed.level;
            task
        })
        .collect()
}

// ---------------------------------------------------------------------
// Wyrm (New -> WyrmAssigned)
// ---------------------------------------------------------------------

pub struct WyrmCycle {
    repo: Arc<ProjectRepository>,
    gateway: Arc<ProviderGateway>,
}

impl WyrmCycle {
    pub fn new(repo: Arc<ProjectRepository>, gateway: Arc<ProviderGateway>) -> Self {
        Self { repo, gateway }
    }
}

#[async_trait]
impl Cycle for WyrmCycle {
    async fn run_cycle(&self, semaphore: Arc<Semaphore>) {
        let projects = self.repo.by_status(ProjectStatus::New);
        let mut handles = Vec::with_capacity(projects.len());
        for project in projects {
            let Ok(permit) = semaphore.clone().acquire_owned().await else { continue };
            let repo = self.repo.clone();
            let gateway = self.gateway.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                run_wyrm_for(&repo, &gateway, project).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn run_wyrm_for(repo: &ProjectRepository, gateway: &ProviderGateway, mut project: Project) {
    if project.active_spec_version().is_none() {
        warn!(project_id = %project.id, "wyrm cycle: project has no specification version yet, skipping");
        return;
    }
    let specification = match std::fs::read_to_string(&project.paths.specification) {
        Ok(content) => content,
        Err(e) => {
            error!(project_id = %project.id, error = %e, "wyrm cycle: failed to read specification");
            return;
        }
    };

    let ctx = ToolContext::new(PathBuf::from(&project.paths.workspace), project.id.clone());
    match agent::run_wyrm(&project.id, &specification, gateway, &ctx).await {
        Ok(recommendation) => {
            match serde_json::to_vec_pretty(&recommendation) {
                Ok(json) => {
                    if let Err(e) = taskstore::atomic_write(Path::new(&project.paths.wyrm_recommendation), &json) {
                        error!(project_id = %project.id, error = %e, "wyrm cycle: failed to write recommendation");
                    }
                }
                Err(e) => error!(project_id = %project.id, error = %e, "wyrm cycle: failed to serialize recommendation"),
            }

            if let Err(e) = pipeline::transition(&mut project, ProjectStatus::WyrmAssigned) {
                error!(project_id = %project.id, error = %e, "wyrm cycle: illegal transition after recommendation");
                return;
            }
            save_project(repo, &project).await;
            info!(project_id = %project.id, "wyrm cycle: recommendation written");
        }
        Err(e) => warn!(project_id = %project.id, error = %e, "wyrm cycle: run failed, will retry next tick"),
    }
}

// ---------------------------------------------------------------------
// Wyvern (WyrmAssigned -> Analyzed)
// ---------------------------------------------------------------------

pub struct WyvernCycle {
    repo: Arc<ProjectRepository>,
    gateway: Arc<ProviderGateway>,
}

impl WyvernCycle {
    pub fn new(repo: Arc<ProjectRepository>, gateway: Arc<ProviderGateway>) -> Self {
        Self { repo, gateway }
    }
}

#[async_trait]
impl Cycle for WyvernCycle {
    async fn run_cycle(&self, semaphore: Arc<Semaphore>) {
        let projects = self.repo.by_status(ProjectStatus::WyrmAssigned);
        let mut handles = Vec::with_capacity(projects.len());
        for project in projects {
            let Ok(permit) = semaphore.clone().acquire_owned().await else { continue };
            let repo = self.repo.clone();
            let gateway = self.gateway.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                run_wyvern_for(&repo, &gateway, project).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn run_wyvern_for(repo: &ProjectRepository, gateway: &ProviderGateway, mut project: Project) {
    let Some(spec_version) = project.active_spec_version().cloned() else {
        warn!(project_id = %project.id, "wyvern cycle: project has no specification version yet, skipping");
        return;
    };
    let specification = match std::fs::read_to_string(&project.paths.specification) {
        Ok(content) => content,
        Err(e) => {
            error!(project_id = %project.id, error = %e, "wyvern cycle: failed to read specification");
            return;
        }
    };
    let recommendation_json = std::fs::read_to_string(&project.paths.wyrm_recommendation).unwrap_or_else(|_| "{}".to_string());

    let ctx = ToolContext::new(PathBuf::from(&project.paths.workspace), project.id.clone());
    match agent::run_wyvern(&project.id, &specification, &recommendation_json, &spec_version.version_id, gateway, &ctx).await {
        Ok(outcome) => {
            let rendered_md = agent::render_analysis_markdown(&outcome.analysis);
            let analysis_json = match serde_json::to_vec_pretty(&outcome.analysis) {
                Ok(json) => json,
                Err(e) => {
                    error!(project_id = %project.id, error = %e, "wyvern cycle: failed to serialize analysis");
                    return;
                }
            };
            if let Err(e) = taskstore::atomic_write(Path::new(&project.paths.analysis_json), &analysis_json) {
                error!(project_id = %project.id, error = %e, "wyvern cycle: failed to write analysis.json");
                return;
            }
            if let Err(e) = taskstore::atomic_write(Path::new(&project.paths.analysis_md), rendered_md.as_bytes()) {
                warn!(project_id = %project.id, error = %e, "wyvern cycle: failed to write analysis.md");
            }

            let mut task_file_paths = Vec::with_capacity(outcome.task_files.len());
            for (area_name, tasks) in &outcome.task_files {
                let path = area_task_file_path(&project, area_name);
                let rendered = task_file::render("", &task_file::rows_from_tasks(tasks));
                if let Err(e) = taskstore::atomic_write(&path, rendered.as_bytes()) {
                    error!(project_id = %project.id, area = %area_name, error = %e, "wyvern cycle: failed to write task file");
                    continue;
                }
                task_file_paths.push(path.display().to_string());
            }

            project.paths.task_files = task_file_paths;
            if let Err(e) = pipeline::transition(&mut project, ProjectStatus::Analyzed) {
                error!(project_id = %project.id, error = %e, "wyvern cycle: illegal transition after analysis");
                return;
            }
            save_project(repo, &project).await;
            info!(project_id = %project.id, areas = outcome.analysis.areas.len(), "wyvern cycle: analysis written");
        }
        Err(e) => warn!(project_id = %project.id, error = %e, "wyvern cycle: run failed, will retry next tick"),
    }
}

// ---------------------------------------------------------------------
// Drake execution / monitoring (Analyzed -> InProgress -> AwaitingVerification)
// ---------------------------------------------------------------------

struct LiveKobold {
    kobold: Arc<Mutex<Kobold>>,
    project_id: String,
    task_id: String,
    area_path: PathBuf,
}

/// The one piece of Drake state that survives a tick boundary: which
/// Kobolds are still running. Shared between [`DrakeExecutionCycle`] (which
/// starts them) and [`DrakeMonitoringCycle`] (which reconciles their
/// terminal status back into the task files).
#[derive(Clone, Default)]
pub struct KoboldRegistry(Arc<Mutex<Vec<LiveKobold>>>);

impl KoboldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn working_count(&self, project_id: &str) -> usize {
        let mut count = 0;
        for live in self.0.lock().await.iter().filter(|l| l.project_id == project_id) {
            if live.kobold.lock().await.status == KoboldStatus::Working {
                count += 1;
            }
        }
        count
    }

    async fn push(&self, live: LiveKobold) {
        self.0.lock().await.push(live);
    }

    /// Drains every Kobold that has reached `Done`, returning its task file
    /// path, task id, and terminal success so the monitoring cycle can
    /// reconcile each one back into its task row.
    async fn drain_finished(&self) -> Vec<(PathBuf, String, bool)> {
        let mut slots = self.0.lock().await;
        let mut finished = Vec::new();
        let mut remaining = Vec::with_capacity(slots.len());
        for live in slots.drain(..) {
            let snapshot = live.kobold.lock().await.clone();
            if snapshot.status == KoboldStatus::Done {
                finished.push((live.area_path, live.task_id, snapshot.is_success()));
            } else {
                remaining.push(live);
            }
        }
        *slots = remaining;
        finished
    }

    /// Kobolds still in `Working`, for `td status`'s `active_kobolds`.
    pub async fn total_working(&self) -> usize {
        let mut count = 0;
        for live in self.0.lock().await.iter() {
            if live.kobold.lock().await.status == KoboldStatus::Working {
                count += 1;
            }
        }
        count
    }

    /// Distinct task files with at least one live Kobold - the closest
    /// proxy for "active Drakes" given Drakes aren't persisted between
    /// ticks.
    pub async fn distinct_areas(&self) -> usize {
        self.0.lock().await.iter().map(|l| l.area_path.clone()).collect::<HashSet<_>>().len()
    }
}

pub struct DrakeExecutionCycle {
    repo: Arc<ProjectRepository>,
    gateway: Arc<ProviderGateway>,
    plans: Arc<PlanStore>,
    kobolds: KoboldRegistry,
}

impl DrakeExecutionCycle {
    pub fn new(repo: Arc<ProjectRepository>, gateway: Arc<ProviderGateway>, plans: Arc<PlanStore>, kobolds: KoboldRegistry) -> Self {
        Self { repo, gateway, plans, kobolds }
    }
}

#[async_trait]
impl Cycle for DrakeExecutionCycle {
    async fn run_cycle(&self, semaphore: Arc<Semaphore>) {
        let projects = self.repo.by_status(ProjectStatus::Analyzed);
        let mut handles = Vec::with_capacity(projects.len());
        for project in projects {
            let Ok(permit) = semaphore.clone().acquire_owned().await else { continue };
            let repo = self.repo.clone();
            let gateway = self.gateway.clone();
            let plans = self.plans.clone();
            let kobolds = self.kobolds.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                drive_project(&repo, &gateway, &plans, &kobolds, project).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn drive_project(repo: &ProjectRepository, gateway: &ProviderGateway, plans: &PlanStore, kobolds: &KoboldRegistry, mut project: Project) {
    let Some(analysis) = load_analysis(&project) else {
        warn!(project_id = %project.id, "drake execution: no analysis.json found, skipping");
        return;
    };

    if project.status == ProjectStatus::Analyzed && pipeline::transition(&mut project, ProjectStatus::InProgress).is_ok() {
        save_project(repo, &project).await;
    }

    let specification = std::fs::read_to_string(&project.paths.specification).unwrap_or_default();
    let spec_version_id = project.active_spec_version().map(|v| v.version_id.clone()).unwrap_or_default();

    // First pass: load every area's task file, keeping the store around so
    // a summon further down can flush straight back through it.
    let mut loaded: Vec<(PathBuf, TaskFileStore, Vec<Task>)> = Vec::with_capacity(analysis.areas.len());
    for area in &analysis.areas {
        let path = area_task_file_path(&project, &area.name);
        let known = materialize_known(area, &spec_version_id);
        match TaskFileStore::load(&path, &known) {
            Ok((store, tasks)) => loaded.push((path, store, tasks)),
            Err(e) => error!(project_id = %project.id, area = %area.name, error = %e, "drake execution: malformed task file, skipping area"),
        }
    }

    let lowest_incomplete_level =
        loaded.iter().flat_map(|(_, _, tasks)| tasks.iter()).filter(|t| t.status != TaskStatus::Done).map(|t| t.level).min();
    let Some(lowest_incomplete_level) = lowest_incomplete_level else {
        // Every known task is Done: nothing left for this cycle but to wait
        // for DrakeMonitoringCycle to notice no live Kobolds remain either.
        return;
    };

    let cap = Service::DrakeExecution.workers_per_project().unwrap_or(4);
    let working = kobolds.working_count(&project.id).await;
    let mut available = cap.saturating_sub(working);

    for (path, store, tasks) in loaded {
        if available == 0 {
            break;
        }
        let eligible: Vec<Task> =
            tasks.iter().filter(|t| t.status == TaskStatus::Unassigned && t.level == lowest_incomplete_level).cloned().collect();
        if eligible.is_empty() {
            continue;
        }

        let info = DrakeInfo::new(path.display().to_string(), path.display().to_string(), project.id.clone());
        let mut supervisor = DrakeSupervisor::new(info, tasks, Arc::new(store));
        let mut summoned_any = false;

        for task in eligible {
            if available == 0 {
                break;
            }
            let Some(kobold_id) = supervisor.summon_kobold(&task.id, &task.assigned_agent_type).await else { continue };
            let Some(kobold) = supervisor.kobold(&kobold_id).await else { continue };
            summoned_any = true;
            available -= 1;

            let shared = Arc::new(Mutex::new(kobold));
            kobolds.push(LiveKobold { kobold: shared.clone(), project_id: project.id.clone(), task_id: task.id.clone(), area_path: path.clone() }).await;

            let gateway = Arc::clone(gateway);
            let plans = Arc::clone(plans);
            let workspace = PathBuf::from(&project.paths.workspace);
            let description = task.description.clone();
            let project_id = project.id.clone();
            let spec_version_id = spec_version_id.clone();
            let structure_hints = analysis.structure.architecture_notes.clone();
            let spec_for_kobold = specification.clone();

            tokio::spawn(async move {
                let mut kobold = shared.lock().await;
                let ctx_info = KoboldContext { specification: spec_for_kobold, structure_hints, similar_task_insights: Vec::new(), files_in_use_elsewhere: Vec::new() };
                let result =
                    agent::kobold_start_work(&mut kobold, &description, &gateway, plans.as_ref(), &project_id, &spec_version_id, workspace, ctx_info, None).await;
                if let Err(e) = result {
                    warn!(%project_id, kobold_id = %kobold.id, error = %e, "drake execution: kobold loop errored");
                }
            });
        }

        if summoned_any {
            supervisor.flush().await;
        }
    }
}

pub struct DrakeMonitoringCycle {
    repo: Arc<ProjectRepository>,
    kobolds: KoboldRegistry,
}

impl DrakeMonitoringCycle {
    pub fn new(repo: Arc<ProjectRepository>, kobolds: KoboldRegistry) -> Self {
        Self { repo, kobolds }
    }
}

#[async_trait]
impl Cycle for DrakeMonitoringCycle {
    async fn run_cycle(&self, _semaphore: Arc<Semaphore>) {
        let finished = self.kobolds.drain_finished().await;
        let mut touched_paths: HashSet<PathBuf> = HashSet::new();
        for (path, task_id, succeeded) in &finished {
            touched_paths.insert(path.clone());
            if let Err(e) = reconcile_one(path, task_id, *succeeded) {
                error!(path = %path.display(), %task_id, error = %e, "drake monitoring: failed to reconcile task file");
            }
        }

        if touched_paths.is_empty() {
            return;
        }

        // A project whose task files are all fully Done moves on to
        // verification; re-check every project that just had a Kobold
        // finish against its own analysis.
        let mut projects_to_check: HashSet<String> = HashSet::new();
        for path in &touched_paths {
            if let Some(project) = self.repo.all().into_iter().find(|p| path.starts_with(Path::new(&p.paths.root))) {
                projects_to_check.insert(project.id);
            }
        }

        for project_id in projects_to_check {
            let Some(mut project) = ProjectRepositoryTrait::get(self.repo.as_ref(), &project_id).await else { continue };
            if project.status != ProjectStatus::InProgress {
                continue;
            }
            let Some(analysis) = load_analysis(&project) else { continue };
            let spec_version_id = project.active_spec_version().map(|v| v.version_id.clone()).unwrap_or_default();
            let all_done = analysis.areas.iter().all(|area| {
                let path = area_task_file_path(&project, &area.name);
                let known = materialize_known(area, &spec_version_id);
                TaskFileStore::load(&path, &known).map(|(_, tasks)| tasks.iter().all(|t| t.status == TaskStatus::Done)).unwrap_or(false)
            });
            if all_done && pipeline::transition(&mut project, ProjectStatus::AwaitingVerification).is_ok() {
                save_project(&self.repo, &project).await;
                info!(project_id = %project.id, "drake monitoring: all task files drained, awaiting verification");
            }
        }
    }
}

fn reconcile_one(path: &Path, task_id: &str, succeeded: bool) -> eyre::Result<()> {
    let content = std::fs::read_to_string(path)?;
    let parsed = task_file::parse(&content)?;
    let mut rows = parsed.rows;
    if let Some(row) = rows.iter_mut().find(|r| r.id == task_id) {
        row.status = if succeeded { TaskStatus::Done } else { TaskStatus::Failed };
    }
    let rendered = task_file::render(&parsed.preamble, &rows);
    taskstore::atomic_write(path, rendered.as_bytes())
}

// ---------------------------------------------------------------------
// Verification (AwaitingVerification -> Verified/Completed, or back to
// InProgress with fresh fix tasks)
// ---------------------------------------------------------------------

pub struct VerificationCycle {
    repo: Arc<ProjectRepository>,
    step_timeout: std::time::Duration,
}

impl VerificationCycle {
    pub fn new(repo: Arc<ProjectRepository>, step_timeout: std::time::Duration) -> Self {
        Self { repo, step_timeout }
    }
}

#[async_trait]
impl Cycle for VerificationCycle {
    async fn run_cycle(&self, semaphore: Arc<Semaphore>) {
        let projects = self.repo.by_status(ProjectStatus::AwaitingVerification);
        let mut handles = Vec::with_capacity(projects.len());
        for project in projects {
            let Ok(permit) = semaphore.clone().acquire_owned().await else { continue };
            let repo = self.repo.clone();
            let timeout = self.step_timeout;
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                verify_one(&repo, project, timeout).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn verify_one(repo: &ProjectRepository, mut project: Project, step_timeout: std::time::Duration) {
    if project.imported && project.verification_config.skip_for_imported_projects {
        project.verification = agent::skipped_verification();
        if pipeline::transition(&mut project, ProjectStatus::Verified).is_ok() {
            let _ = pipeline::transition(&mut project, ProjectStatus::Completed);
            save_project(repo, &project).await;
        }
        return;
    }

    let workspace = PathBuf::from(&project.paths.workspace);
    let recommendation = load_wyrm_recommendation(&project);
    let spec_version_id = project.active_spec_version().map(|v| v.version_id.clone()).unwrap_or_default();

    let outcome = agent::run_verification(
        &workspace,
        recommendation.as_ref(),
        project.verification_config.require_all_checks_passing,
        &spec_version_id,
        step_timeout,
    )
    .await;

    project.verification = outcome.state;

    if outcome.passed {
        if pipeline::transition(&mut project, ProjectStatus::Verified).is_ok() {
            let _ = pipeline::transition(&mut project, ProjectStatus::Completed);
            save_project(repo, &project).await;
            info!(project_id = %project.id, "verification cycle: project completed");
        }
        return;
    }

    if !project.verification_config.auto_create_fix_tasks {
        save_project(repo, &project).await;
        warn!(project_id = %project.id, "verification cycle: failed, auto-fix-tasks disabled");
        return;
    }

    let fix_tasks = outcome.fix_tasks.unwrap_or_default();
    if let Err(e) = write_fix_tasks(&project, fix_tasks) {
        error!(project_id = %project.id, error = %e, "verification cycle: failed to write fix tasks");
    }

    if pipeline::transition(&mut project, ProjectStatus::InProgress).is_ok() {
        save_project(repo, &project).await;
        warn!(project_id = %project.id, "verification cycle: failed, fix tasks queued");
    }
}

fn write_fix_tasks(project: &Project, fix_tasks: Vec<Task>) -> eyre::Result<()> {
    if fix_tasks.is_empty() {
        return Ok(());
    }
    let path = area_task_file_path(project, "verification-fixes");
    let existing = std::fs::read_to_string(&path).ok();
    let mut rows = existing.and_then(|c| task_file::parse(&c).ok()).map(|p| p.rows).unwrap_or_default();
    rows.extend(task_file::rows_from_tasks(&fix_tasks));
    let rendered = task_file::render("# Fixes\n\nVerification-generated follow-up tasks.", &rows);
    taskstore::atomic_write(&path, rendered.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn area_task_file_path_sanitizes_the_area_name() {
        let mut project = Project::new("demo", "/tmp/demo-root");
        project.paths.root = "/tmp/demo-root".to_string();
        let path = area_task_file_path(&project, "Backend API");
        assert_eq!(path, PathBuf::from("/tmp/demo-root/tasks/backend-api-tasks.md"));
    }

    #[tokio::test]
    async fn kobold_registry_reports_zero_working_when_empty() {
        let registry = KoboldRegistry::new();
        assert_eq!(registry.working_count("p1").await, 0);
    }

    #[test]
    fn write_fix_tasks_is_a_noop_for_an_empty_list() {
        let dir = tempdir().unwrap();
        let mut project = Project::new("demo", dir.path().to_str().unwrap());
        project.paths.root = dir.path().to_str().unwrap().to_string();
        assert!(write_fix_tasks(&project, Vec::new()).is_ok());
        assert!(!area_task_file_path(&project, "verification-fixes").exists());
    }

    #[test]
    fn write_fix_tasks_uses_the_literal_fix_task_filename() {
        let dir = tempdir().unwrap();
        let mut project = Project::new("demo", dir.path().to_str().unwrap());
        project.paths.root = dir.path().to_str().unwrap().to_string();
        let task = Task::new("fix-1", "fix the thing", "spec-1");
        write_fix_tasks(&project, vec![task]).unwrap();
        assert!(dir.path().join("tasks").join("verification-fixes-tasks.md").exists());
    }
}
