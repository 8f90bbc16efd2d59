//! Provider configuration and the "is this actually configured" gate
//! described in §4.1. Lives in `llm` because the shape is intrinsic to the
//! gateway, not the application's broader config surface (`crate::config`
//! embeds `LlmConfig` verbatim, plus per-project overrides from §6.6).

use serde::{Deserialize, Serialize};
use thiserror::Error;

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: "claude-sonnet-4-5".to_string(),
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigResolveError {
    #[error("environment variable {0} is not set")]
    MissingEnvVar(String),
}

/// `LlmConfig` plus whatever an override chain (§6.6) contributed, with the
/// API key already read from its environment variable (or left absent).
#[derive(Debug, Clone)]
pub struct ResolvedLlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl LlmConfig {
    pub fn resolve(&self) -> Result<ResolvedLlmConfig, ConfigResolveError> {
        let api_key = std::env::var(&self.api_key_env).ok();
        Ok(ResolvedLlmConfig {
            provider: self.provider.clone(),
            model: self.model.clone(),
            api_key,
            base_url: self.base_url.clone(),
            max_tokens: self.max_tokens,
            timeout_ms: self.timeout_ms,
        })
    }
}

impl ResolvedLlmConfig {
    /// Apply a `{provider, model}` override from `Project.provider_overrides`
    /// without re-reading the environment (same api key, new model/base).
    pub fn with_override(&self, model: &str, provider: Option<&str>) -> Self {
        Self { provider: provider.map(str::to_string).unwrap_or_else(|| self.provider.clone()), model: model.to_string(), ..self.clone() }
    }

    /// §4.1's configuration gate: missing key, or a key that still looks
    /// like an unresolved template placeholder (`${...}`).
    pub fn is_configured(&self) -> bool {
        match &self.api_key {
            None => false,
            Some(key) => !key.is_empty() && !key.starts_with("${"),
        }
    }

    pub fn get_api_key(&self) -> Result<String, ConfigResolveError> {
        self.api_key.clone().filter(|k| !k.is_empty()).ok_or_else(|| ConfigResolveError::MissingEnvVar("api key".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_not_configured() {
        let cfg = ResolvedLlmConfig { provider: "openai".into(), model: "m".into(), api_key: None, base_url: "x".into(), max_tokens: 1, timeout_ms: 1 };
        assert!(!cfg.is_configured());
    }

    #[test]
    fn placeholder_key_is_not_configured() {
        let cfg = ResolvedLlmConfig { provider: "openai".into(), model: "m".into(), api_key: Some("${OPENAI_API_KEY}".into()), base_url: "x".into(), max_tokens: 1, timeout_ms: 1 };
        assert!(!cfg.is_configured());
    }

    #[test]
    fn real_key_is_configured() {
        let cfg = ResolvedLlmConfig { provider: "openai".into(), model: "m".into(), api_key: Some("sk-real".into()), base_url: "x".into(), max_tokens: 1, timeout_ms: 1 };
        assert!(cfg.is_configured());
    }
}
