//! ContextStore - the shared planning context.
//!
//! Every project being worked gets one [`PlanningContext`]: the set of
//! agents currently active on it, an advisory map of files they intend to
//! touch, and a capped history of completed-task insights used to prime
//! future planners. A [`ContextStore`] is the process-wide, LRU-capped,
//! disk-backed registry of these contexts.
//!
//! # Layout
//!
//! ```text
//! {ProjectsPath}/{project}/planning-context.json
//! ```
//!
//! # Example
//!
//! ```ignore
//! use contextstore::ContextStore;
//!
//! let store = ContextStore::open("/var/lib/forgecore/projects")?;
//! store.register_agent("proj-1", "kobold-a", "task-1", "backend")?;
//! let busy = store.is_file_in_use("proj-1", "src/api/users.ts")?;
//! ```

pub mod cli;
pub mod config;
mod store;

pub use store::{
    ActiveAgent, ContextStore, MAX_CACHED_CONTEXTS, MAX_INSIGHTS, PlanningContext, PlanningInsight, ProjectStatistics,
};
