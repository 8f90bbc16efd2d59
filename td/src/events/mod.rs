//! Session event stream (§6.5): Dragon emits typed [`DragonEvent`]s over an
//! `mpsc` channel as it works - assistant text, tool calls and results,
//! prompts, specification creation, and errors. Transport/WebSocket wiring
//! to an actual client is out of scope; this module provides the two
//! pieces the core owns: a [`PromptBroker`] that turns `ask_user` into a
//! prompt/`prompt_response` round-trip, and a session event log for
//! history and replay.

mod broker;
mod log;
mod types;

pub use broker::{DEFAULT_PROMPT_TIMEOUT, PromptBroker};
pub use log::{SessionEventEntry, read_session_events, spawn_session_event_log};
pub use types::{DragonEvent, PromptResponse};
