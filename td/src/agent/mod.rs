//! Agent roles (§4.3-§4.11): the generic agent loop plus the five
//! cooperating roles built on top of it - Kobold (implementation worker),
//! Drake (per-task-file supervisor), Wyrm (pre-analyzer), Wyvern (detailed
//! analyzer), the verifier, and Dragon (the user-facing session).

mod dragon;
mod drake;
mod failure;
mod kobold;
mod loop_engine;
mod verifier;
mod wyrm;
mod wyvern;

pub use dragon::{DragonEvent, DragonSession, ProjectRepository, log_tool_call};
pub use drake::{DrakeSupervisor, TaskFileSink, default_stuck_timeout};
pub use failure::scan_for_error_markers;
pub use kobold::{KoboldContext, KoboldOutcome, PlanRepository, start_work as kobold_start_work};
pub use loop_engine::{AgentLoop, AgentLoopResult, KOBOLD_MAX_ITERATIONS};
pub use verifier::{VerificationOutcome, default_step_timeout, run_verification, skipped_verification};
pub use wyrm::{WyrmError, run_wyrm};
pub use wyvern::{WyvernError, WyvernOutcome, render_analysis_markdown, run_wyvern};
