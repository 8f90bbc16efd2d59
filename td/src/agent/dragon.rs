//! Dragon session (§4.10): one session per connected client. Runs an agent
//! loop with a distinguished tool set that mutates persisted project state
//! directly - Dragon never touches in-flight plans.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::{Project, ProjectStatus, VerificationState};
use crate::llm::{ProviderGateway, ToolCall};
use crate::prompts::PromptLoader;
use crate::tools::{Tool, ToolContext, ToolExecutor, ToolResult};

use super::loop_engine::{AgentLoop, AgentLoopResult};

const SYSTEM_PROMPT: &str = "You are Dragon, the orchestration assistant a developer talks to \
directly. Use your tools to write specifications, register projects, and manage their lifecycle. \
Never edit a project's generated workspace yourself - that is the job of the downstream agents.";

/// Renders Dragon's system prompt through the project's override chain,
/// falling back to the literal above on any loader error.
fn system_prompt(workspace: Option<&std::path::Path>) -> String {
    let loader = workspace.map(PromptLoader::new).unwrap_or_else(PromptLoader::embedded_only);
    loader.render("dragon", &serde_json::json!({})).unwrap_or_else(|e| {
        warn!(error = %e, "dragon session: falling back to the built-in system prompt");
        SYSTEM_PROMPT.to_string()
    })
}

/// Typed events streamed to the session transport, which is out of scope
/// here (§4.10, §6.5).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum DragonEvent {
    AssistantText(String),
    ToolCall { name: String, input: Value },
    ToolResult { name: String, content: String, is_error: bool },
    /// `prompt_id` is what the transport echoes back in `prompt_response` to
    /// resolve the matching `ask_user` suspension (see `events::PromptBroker`).
    Prompt { prompt_id: String, question: String },
    SpecificationCreated { project_id: String },
    Error(String),
}

/// Everything Dragon's tools need to read and mutate persisted project
/// state. Implemented by the project repository; kept as a trait here so
/// this module doesn't depend on the storage layer directly.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Option<Project>;
    async fn get(&self, project_id: &str) -> Option<Project>;
    async fn list(&self) -> Vec<Project>;
    async fn save(&self, project: &Project) -> eyre::Result<()>;
    /// Writes `content` to the project's spec file and appends a
    /// `SpecVersion` iff the content changed. Returns the (possibly
    /// freshly-registered) project.
    async fn write_specification(&self, project_name: &str, content: &str) -> eyre::Result<Project>;
    /// Scans `path` and registers a `Prototype` project for it, synthesizing
    /// an initial specification from what's found.
    async fn add_existing_project(&self, path: &str, project_name: Option<&str>) -> eyre::Result<Project>;
    async fn transition(&self, project_id: &str, to: ProjectStatus) -> eyre::Result<()>;
    async fn verification_state(&self, project_id: &str) -> Option<VerificationState>;
}

pub struct DragonSession<'a> {
    gateway: &'a ProviderGateway,
    repository: Arc<dyn ProjectRepository>,
    events: mpsc::UnboundedSender<DragonEvent>,
}

impl<'a> DragonSession<'a> {
    pub fn new(gateway: &'a ProviderGateway, repository: Arc<dyn ProjectRepository>, events: mpsc::UnboundedSender<DragonEvent>) -> Self {
        Self { gateway, repository, events }
    }

    pub async fn handle_message(&self, user_message: &str, ctx: &ToolContext) {
        let tools = self.tool_executor();
        let prompt = system_prompt(Some(&ctx.workspace));

        let result = AgentLoop::new(self.gateway, &tools).run(&prompt, user_message, ctx).await;

        match result {
            AgentLoopResult::Complete { text } | AgentLoopResult::TaskCompleted { text } => {
                let _ = self.events.send(DragonEvent::AssistantText(text));
            }
            AgentLoopResult::MaxIterations => {
                let _ = self.events.send(DragonEvent::Error("reached the iteration bound without finishing".to_string()));
            }
            AgentLoopResult::Failed { message } => {
                let _ = self.events.send(DragonEvent::Error(message));
            }
        }
    }

    fn tool_executor(&self) -> ToolExecutor {
        let mut executor = ToolExecutor::empty();
        let repo = self.repository.clone();
        let events = self.events.clone();
        executor.add_tool(Box::new(WriteSpecificationTool { repo: repo.clone(), events: events.clone() }));
        executor.add_tool(Box::new(AddExistingProjectTool { repo: repo.clone() }));
        executor.add_tool(Box::new(ApproveSpecificationTool { repo: repo.clone() }));
        executor.add_tool(Box::new(ListProjectsTool { repo: repo.clone() }));
        executor.add_tool(Box::new(RetryVerificationTool { repo: repo.clone() }));
        executor.add_tool(Box::new(ViewVerificationReportTool { repo: repo.clone() }));
        executor.add_tool(Box::new(SkipVerificationTool { repo: repo.clone() }));
        executor.add_tool(Box::new(ViewSpecificationHistoryTool { repo }));
        executor
    }
}

struct WriteSpecificationTool {
    repo: Arc<dyn ProjectRepository>,
    events: mpsc::UnboundedSender<DragonEvent>,
}

#[async_trait]
impl Tool for WriteSpecificationTool {
    fn name(&self) -> &'static str {
        "write_specification"
    }
    fn description(&self) -> &'static str {
        "Create or overwrite a project's specification file. Registers the project as Prototype if it doesn't exist yet."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type":"object","properties":{"filename":{"type":"string"},"content":{"type":"string"}},"required":["filename","content"]})
    }
    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let Some(filename) = input.get("filename").and_then(|v| v.as_str()) else { return ToolResult::error("filename is required") };
        let Some(content) = input.get("content").and_then(|v| v.as_str()) else { return ToolResult::error("content is required") };

        match self.repo.write_specification(filename, content).await {
            Ok(project) => {
                let _ = self.events.send(DragonEvent::SpecificationCreated { project_id: project.id.clone() });
                ToolResult::success(format!("Specification written for project {}", project.name))
            }
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

struct AddExistingProjectTool {
    repo: Arc<dyn ProjectRepository>,
}

#[async_trait]
impl Tool for AddExistingProjectTool {
    fn name(&self) -> &'static str {
        "add_existing_project"
    }
    fn description(&self) -> &'static str {
        "Scan an existing directory and register it as a Prototype project with a synthesized specification."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type":"object","properties":{"path":{"type":"string"},"project_name":{"type":"string"}},"required":["path"]})
    }
    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let Some(path) = input.get("path").and_then(|v| v.as_str()) else { return ToolResult::error("path is required") };
        let project_name = input.get("project_name").and_then(|v| v.as_str());

        match self.repo.add_existing_project(path, project_name).await {
            Ok(project) => ToolResult::success(format!("Registered existing project {} ({})", project.name, project.id)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

struct ApproveSpecificationTool {
    repo: Arc<dyn ProjectRepository>,
}

#[async_trait]
impl Tool for ApproveSpecificationTool {
    fn name(&self) -> &'static str {
        "approve_specification"
    }
    fn description(&self) -> &'static str {
        "Approve a project's specification, moving it from Prototype to New so periodic workers pick it up."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type":"object","properties":{"project_name":{"type":"string"},"confirmation":{"type":"string"}},"required":["project_name","confirmation"]})
    }
    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let Some(project_name) = input.get("project_name").and_then(|v| v.as_str()) else { return ToolResult::error("project_name is required") };
        let confirmation = input.get("confirmation").and_then(|v| v.as_str()).unwrap_or("");

        if confirmation != "yes" {
            return ToolResult::success("Approval requires confirmation = \"yes\"; no change made.");
        }

        let Some(project) = self.repo.find_by_name(project_name).await else { return ToolResult::error(format!("no such project: {project_name}")) };
        if project.status != ProjectStatus::Prototype {
            return ToolResult::error(format!("project {project_name} is not in Prototype (currently {})", project.status));
        }

        match self.repo.transition(&project.id, ProjectStatus::New).await {
            Ok(()) => ToolResult::success(format!("{project_name} approved and moved to New")),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

struct ListProjectsTool {
    repo: Arc<dyn ProjectRepository>,
}

#[async_trait]
impl Tool for ListProjectsTool {
    fn name(&self) -> &'static str {
        "list_projects"
    }
    fn description(&self) -> &'static str {
        "Enumerate all registered projects and their current status."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type":"object","properties":{}})
    }
    async fn execute(&self, _input: Value, _ctx: &ToolContext) -> ToolResult {
        let projects = self.repo.list().await;
        if projects.is_empty() {
            return ToolResult::success("No projects registered.");
        }
        let lines: Vec<String> = projects.iter().map(|p| format!("- {} ({}): {}", p.name, p.id, p.status)).collect();
        ToolResult::success(lines.join("\n"))
    }
}

struct RetryVerificationTool {
    repo: Arc<dyn ProjectRepository>,
}

#[async_trait]
impl Tool for RetryVerificationTool {
    fn name(&self) -> &'static str {
        "retry_verification"
    }
    fn description(&self) -> &'static str {
        "Move a project back into AwaitingVerification so the verifier runs again."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type":"object","properties":{"project_name":{"type":"string"}},"required":["project_name"]})
    }
    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let Some(project_name) = input.get("project_name").and_then(|v| v.as_str()) else { return ToolResult::error("project_name is required") };
        let Some(project) = self.repo.find_by_name(project_name).await else { return ToolResult::error(format!("no such project: {project_name}")) };

        match self.repo.transition(&project.id, ProjectStatus::AwaitingVerification).await {
            Ok(()) => ToolResult::success(format!("{project_name} queued for verification")),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

struct ViewVerificationReportTool {
    repo: Arc<dyn ProjectRepository>,
}

#[async_trait]
impl Tool for ViewVerificationReportTool {
    fn name(&self) -> &'static str {
        "view_verification_report"
    }
    fn description(&self) -> &'static str {
        "Read a project's most recent verification report."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type":"object","properties":{"project_name":{"type":"string"}},"required":["project_name"]})
    }
    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let Some(project_name) = input.get("project_name").and_then(|v| v.as_str()) else { return ToolResult::error("project_name is required") };
        let Some(project) = self.repo.find_by_name(project_name).await else { return ToolResult::error(format!("no such project: {project_name}")) };
        let Some(state) = self.repo.verification_state(&project.id).await else { return ToolResult::success("No verification has run yet.") };

        match state.report {
            Some(report) => ToolResult::success(report),
            None => ToolResult::success(format!("Verification status: {:?}, no report text recorded.", state.status)),
        }
    }
}

struct SkipVerificationTool {
    repo: Arc<dyn ProjectRepository>,
}

#[async_trait]
impl Tool for SkipVerificationTool {
    fn name(&self) -> &'static str {
        "skip_verification"
    }
    fn description(&self) -> &'static str {
        "Mark a project's verification as skipped and move it straight to Completed."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type":"object","properties":{"project_name":{"type":"string"}},"required":["project_name"]})
    }
    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let Some(project_name) = input.get("project_name").and_then(|v| v.as_str()) else { return ToolResult::error("project_name is required") };
        let Some(project) = self.repo.find_by_name(project_name).await else { return ToolResult::error(format!("no such project: {project_name}")) };

        match self.repo.transition(&project.id, ProjectStatus::Completed).await {
            Ok(()) => ToolResult::success(format!("{project_name} verification skipped, marked Completed")),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

struct ViewSpecificationHistoryTool {
    repo: Arc<dyn ProjectRepository>,
}

#[async_trait]
impl Tool for ViewSpecificationHistoryTool {
    fn name(&self) -> &'static str {
        "view_specification_history"
    }
    fn description(&self) -> &'static str {
        "Read-only: list a project's recorded specification versions."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type":"object","properties":{"project_name":{"type":"string"}},"required":["project_name"]})
    }
    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let Some(project_name) = input.get("project_name").and_then(|v| v.as_str()) else { return ToolResult::error("project_name is required") };
        let Some(project) = self.repo.find_by_name(project_name).await else { return ToolResult::error(format!("no such project: {project_name}")) };

        if project.spec_versions.is_empty() {
            return ToolResult::success("No specification versions recorded yet.");
        }
        let lines: Vec<String> = project.spec_versions.iter().map(|v| format!("- {} (hash {}, at {})", v.version_id, v.content_hash, v.created_at)).collect();
        ToolResult::success(lines.join("\n"))
    }
}

/// Relays every tool call Dragon makes as a typed event, for callers that
/// want to log or test traffic without wiring a real transport.
pub fn log_tool_call(events: &mpsc::UnboundedSender<DragonEvent>, call: &ToolCall, result: &ToolResult) {
    if events.send(DragonEvent::ToolCall { name: call.name.clone(), input: call.input.clone() }).is_err() {
        warn!("dragon: event receiver dropped");
    }
    let _ = events.send(DragonEvent::ToolResult { name: call.name.clone(), content: result.content.clone(), is_error: result.is_error });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, StopReason, TokenUsage};
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    struct InMemoryRepo {
        projects: StdMutex<Vec<Project>>,
    }

    impl InMemoryRepo {
        fn new() -> Self {
            Self { projects: StdMutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ProjectRepository for InMemoryRepo {
        async fn find_by_name(&self, name: &str) -> Option<Project> {
            self.projects.lock().unwrap().iter().find(|p| p.name == name).cloned()
        }
        async fn get(&self, project_id: &str) -> Option<Project> {
            self.projects.lock().unwrap().iter().find(|p| p.id == project_id).cloned()
        }
        async fn list(&self) -> Vec<Project> {
            self.projects.lock().unwrap().clone()
        }
        async fn save(&self, project: &Project) -> eyre::Result<()> {
            let mut projects = self.projects.lock().unwrap();
            if let Some(existing) = projects.iter_mut().find(|p| p.id == project.id) {
                *existing = project.clone();
            } else {
                projects.push(project.clone());
            }
            Ok(())
        }
        async fn write_specification(&self, project_name: &str, _content: &str) -> eyre::Result<Project> {
            if let Some(existing) = self.find_by_name(project_name).await {
                return Ok(existing);
            }
            let project = Project::new(project_name, format!("/tmp/{project_name}"));
            self.save(&project).await?;
            Ok(project)
        }
        async fn add_existing_project(&self, _path: &str, project_name: Option<&str>) -> eyre::Result<Project> {
            let name = project_name.unwrap_or("imported").to_string();
            let mut project = Project::new(name, "/tmp/imported");
            project.imported = true;
            self.save(&project).await?;
            Ok(project)
        }
        async fn transition(&self, project_id: &str, to: ProjectStatus) -> eyre::Result<()> {
            let mut projects = self.projects.lock().unwrap();
            let project = projects.iter_mut().find(|p| p.id == project_id).ok_or_else(|| eyre::eyre!("no such project"))?;
            crate::pipeline::transition(project, to).map_err(|e| eyre::eyre!(e))?;
            Ok(())
        }
        async fn verification_state(&self, _project_id: &str) -> Option<VerificationState> {
            None
        }
    }

    fn end_turn(text: &str) -> CompletionResponse {
        CompletionResponse { content: Some(text.to_string()), tool_calls: vec![], stop_reason: StopReason::EndTurn, usage: TokenUsage::default() }
    }

    #[tokio::test]
    async fn write_specification_tool_registers_a_new_project() {
        let repo = Arc::new(InMemoryRepo::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tool = WriteSpecificationTool { repo: repo.clone(), events: tx };
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "dragon-task".to_string());

        let result = tool.execute(serde_json::json!({"filename": "spec.md", "content": "# Todo app"}), &ctx).await;

        assert!(!result.is_error);
        assert_eq!(repo.list().await.len(), 1);
        assert!(matches!(rx.try_recv(), Ok(DragonEvent::SpecificationCreated { .. })));
    }

    #[tokio::test]
    async fn approve_requires_explicit_yes() {
        let repo = Arc::new(InMemoryRepo::new());
        repo.write_specification("todo-app", "# spec").await.unwrap();
        let tool = ApproveSpecificationTool { repo: repo.clone() };
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "dragon-task".to_string());

        let result = tool.execute(serde_json::json!({"project_name": "todo-app", "confirmation": "no"}), &ctx).await;
        assert!(!result.is_error);
        let project = repo.find_by_name("todo-app").await.unwrap();
        assert_eq!(project.status, ProjectStatus::Prototype);

        let result = tool.execute(serde_json::json!({"project_name": "todo-app", "confirmation": "yes"}), &ctx).await;
        assert!(!result.is_error);
        let project = repo.find_by_name("todo-app").await.unwrap();
        assert_eq!(project.status, ProjectStatus::New);
    }

    #[tokio::test]
    async fn session_emits_assistant_text_on_clean_completion() {
        let mock = MockLlmClient::new(vec![end_turn("Sure, what would you like to build?")]);
        let gateway = ProviderGateway::new(Arc::new(mock), 4096);
        let repo = Arc::new(InMemoryRepo::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = DragonSession::new(&gateway, repo, tx);
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "dragon-task".to_string());

        session.handle_message("hello", &ctx).await;

        assert!(matches!(rx.try_recv(), Ok(DragonEvent::AssistantText(_))));
    }
}
