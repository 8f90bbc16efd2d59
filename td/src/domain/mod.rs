//! Domain types: the persisted records and in-flight structures that make
//! up a project's lifecycle, independent of how they're scheduled, stored,
//! or driven by an LLM.

mod drake;
mod id;
mod kobold;
mod plan;
mod priority;
mod project;
mod spec_version;
mod task;
mod verification;
mod wyrm;
mod wyvern;

pub use drake::DrakeInfo;
pub use id::{generate_id, sanitize_name, short_slug};
pub use kobold::{Kobold, KoboldStateError, KoboldStatus};
pub use plan::{Plan, PlanStatus, PlanStep, StepStatus};
pub use priority::Priority;
pub use project::{Project, ProjectPaths, ProjectStatus, ProviderOverride, VerificationConfig};
pub use spec_version::{SpecVersion, version_if_changed};
pub use task::{Task, TaskStatus, UNASSIGNED_ASSIGNEE};
pub use verification::{CheckType, SuccessCriterion, VerificationCheck, VerificationState, VerificationStatus, VerificationStep};
pub use wyrm::WyrmRecommendation;
pub use wyvern::{AnalysisError, AnalyzedTask, Area, Structure, WyvernAnalysis, compute_levels, ensure_readme_task};

// Re-export taskstore types for convenience
pub use taskstore::{Filter, FilterOp, IndexValue, Record, Store};
