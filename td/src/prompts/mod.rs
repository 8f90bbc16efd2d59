//! System prompt templates for the agent roles that take free-text prompts
//! (§4.7, §4.10). Wyrm and Wyvern's system prompts are strict JSON-contract
//! specifications kept as plain constants in their own modules, since a
//! project override could silently break the parser that reads their
//! output; Dragon and Kobold have no such contract and so are safe to make
//! project-overridable through this loader.

mod embedded;
mod loader;

pub use loader::PromptLoader;
