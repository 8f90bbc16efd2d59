//! Event vocabulary for the session event stream (§6.5).
//!
//! The vocabulary itself (`DragonEvent`) lives next to the session that
//! emits it in [`crate::agent::dragon`]; this module re-exports it so
//! consumers only need to know about `events`, plus the transport-facing
//! `prompt_response` payload the spec calls out by name.

use serde::{Deserialize, Serialize};

pub use crate::agent::DragonEvent;

/// What the transport sends back to resolve an outstanding `ask_user`
/// prompt (§4.10, §6.5): `prompt_response { promptId, answer }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResponse {
    pub prompt_id: String,
    pub answer: String,
}
