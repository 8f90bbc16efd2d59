//! Embedded default prompt templates (§4.7, §4.10), compiled into the
//! binary as the last fallback in the load chain.

use tracing::debug;

/// Dragon's system prompt (§4.10). No template variables.
pub const DRAGON: &str = "You are Dragon, the orchestration assistant a developer talks to \
directly. Use your tools to write specifications, register projects, and manage their lifecycle. \
Never edit a project's generated workspace yourself - that is the job of the downstream agents.";

/// Kobold's system prompt (§4.4), parameterized on `{{agent_type}}`.
pub const KOBOLD: &str = "You are a {{agent_type}} implementation agent working through a fixed \
plan. Call update_plan_step at each step boundary to record progress, and call complete_task \
once the task's work is done and verified locally.";

pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "dragon" => Some(DRAGON),
        "kobold" => Some(KOBOLD),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dragon_prompt_is_embedded() {
        assert!(get_embedded("dragon").unwrap().contains("Dragon"));
    }

    #[test]
    fn kobold_prompt_carries_its_template_variable() {
        assert!(get_embedded("kobold").unwrap().contains("{{agent_type}}"));
    }

    #[test]
    fn unknown_template_is_none() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
