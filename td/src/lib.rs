//! forgecore - autonomous multi-agent orchestration core.
//!
//! Turns a specification into generated code via a pipeline of cooperating
//! LLM-backed agent roles (Dragon, Wyrm, Wyvern, Drake, Kobold) driven by a
//! project lifecycle state machine and a handful of periodic workers.
//! State lives in files and a durable project repository, not in memory -
//! every long-lived actor can be rebuilt from what's on disk.
//!
//! # Modules
//!
//! - [`domain`] - persisted records and in-flight structures
//! - [`agent`] - the agent roles and the loop engine that drives them
//! - [`llm`] - provider gateway and wire types
//! - [`pipeline`] - project status state machine
//! - [`scheduler`] - the five periodic workers and their daemon host
//! - [`state`] - project repository, plan store, markdown task-file round-trip
//! - [`tools`] - tool dispatch for agent loops
//! - [`events`] - session event stream and the ask-user prompt broker
//! - [`ipc`] - CLI-to-daemon Unix socket protocol
//! - [`prompts`] - overridable system prompt templates
//! - [`config`] - layered configuration and its fallback chain
//! - [`cli`] - command-line interface

pub mod agent;
pub mod cli;
pub mod config;
pub mod domain;
pub mod events;
pub mod ipc;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod scheduler;
pub mod state;
pub mod tools;

pub use config::Config;
pub use domain::{
    Kobold, KoboldStatus, Plan, PlanStatus, PlanStep, Priority, Project, ProjectPaths, ProjectStatus, Task, TaskStatus,
    VerificationState, VerificationStatus,
};
pub use events::{DEFAULT_PROMPT_TIMEOUT, DragonEvent, PromptBroker, PromptResponse, SessionEventEntry, read_session_events, spawn_session_event_log};
pub use ipc::{DaemonClient, DaemonMetrics, DaemonRequest, DaemonRequestHandler, DaemonResponse, ProjectSummary, get_socket_path};
pub use llm::{CompletionRequest, CompletionResponse, HttpLlmClient, LlmClient, LlmConfig, LlmError, ProviderGateway};
pub use prompts::PromptLoader;
pub use scheduler::{
    Cycle, DrakeExecutionCycle, DrakeMonitoringCycle, KoboldRegistry, PeriodicWorker, SchedulerConfig, SchedulerDaemon,
    ServiceConfig, VerificationCycle, WyrmCycle, WyvernCycle,
};
pub use state::{PlanStore, ProjectRepository, RecoveryStats, SharedPlanningContext, TaskFileStore, scan_for_recovery, task_counts};
pub use tools::{Tool, ToolContext, ToolError, ToolExecutor, ToolResult};
