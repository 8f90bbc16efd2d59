//! Layered application configuration (§3.1, §4.12): YAML with a fallback
//! chain (explicit path → project-local → user config dir → built-in
//! defaults), `serde(default)` throughout so a partial file is valid and a
//! zero-config run behaves exactly like the built-in defaults.

use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::llm::LlmConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub concurrency: ConcurrencyConfig,
    pub scheduler: SchedulerConfig,
    pub verification: VerificationConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Implements the §3.1 fallback chain: explicit `--config` path, else
    /// `./.forgecore.yml`, else `$XDG_CONFIG_HOME/forgecore/forgecore.yml`,
    /// else built-in defaults. A failure to parse an explicitly-named file
    /// is fatal; a failure to parse an implicitly discovered one is logged
    /// and defaults are used.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load_from_file(path).with_context(|| format!("failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".forgecore.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => warn!(error = %e, path = %local_config.display(), "config: failed to load project-local config"),
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("forgecore").join("forgecore.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => warn!(error = %e, path = %user_config.display(), "config: failed to load user config"),
                }
            }
        }

        info!("config: no config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("failed to parse config file")?;
        info!(path = %path.display(), "config: loaded");
        Ok(config)
    }
}

/// Backs §4.6's per-service caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    #[serde(rename = "max-projects-per-service")]
    pub max_projects_per_service: u32,
    #[serde(rename = "max-workers-per-project")]
    pub max_workers_per_project: u32,
    #[serde(rename = "max-drakes-monitored")]
    pub max_drakes_monitored: u32,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_projects_per_service: 10, max_workers_per_project: 5, max_drakes_monitored: 50 }
    }
}

/// Published interval defaults for the five periodic workers (§4.6),
/// overridable from config; `stagger` toggles the 0/20/40s launch offsets
/// `scheduler::SchedulerConfig::with_default_stagger` applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    #[serde(rename = "wyrm-interval-secs")]
    pub wyrm_interval_secs: u64,
    #[serde(rename = "wyvern-interval-secs")]
    pub wyvern_interval_secs: u64,
    #[serde(rename = "drake-execution-interval-secs")]
    pub drake_execution_interval_secs: u64,
    #[serde(rename = "drake-monitoring-interval-secs")]
    pub drake_monitoring_interval_secs: u64,
    #[serde(rename = "verification-interval-secs")]
    pub verification_interval_secs: u64,
    pub stagger: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wyrm_interval_secs: 15,
            wyvern_interval_secs: 20,
            drake_execution_interval_secs: 30,
            drake_monitoring_interval_secs: 60,
            verification_interval_secs: 45,
            stagger: true,
        }
    }
}

/// Global verification policy defaults; a project's
/// `domain::VerificationConfig` (§6.6) overrides these per project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    #[serde(rename = "step-timeout-secs")]
    pub step_timeout_secs: u64,
    #[serde(rename = "require-all-checks-passing")]
    pub require_all_checks_passing: bool,
    #[serde(rename = "auto-create-fix-tasks")]
    pub auto_create_fix_tasks: bool,
    #[serde(rename = "skip-for-imported-projects")]
    pub skip_for_imported_projects: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self { step_timeout_secs: 600, require_all_checks_passing: true, auto_create_fix_tasks: true, skip_for_imported_projects: true }
    }
}

/// Root of §6.2's on-disk layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "projects-dir")]
    pub projects_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { projects_dir: PathBuf::from(".forgecore/projects") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_published_defaults() {
        let config = Config::default();
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.concurrency.max_drakes_monitored, 50);
        assert_eq!(config.verification.step_timeout_secs, 600);
        assert_eq!(config.storage.projects_dir, PathBuf::from(".forgecore/projects"));
    }

    #[test]
    fn deserialize_overrides_named_fields() {
        let yaml = r#"
llm:
  model: claude-opus-4

concurrency:
  max-drakes-monitored: 25

scheduler:
  wyrm-interval-secs: 5
  stagger: false

verification:
  step-timeout-secs: 120
  auto-create-fix-tasks: false

storage:
  projects-dir: /tmp/forgecore-projects
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.model, "claude-opus-4");
        assert_eq!(config.concurrency.max_drakes_monitored, 25);
        assert_eq!(config.scheduler.wyrm_interval_secs, 5);
        assert!(!config.scheduler.stagger);
        assert_eq!(config.verification.step_timeout_secs, 120);
        assert!(!config.verification.auto_create_fix_tasks);
        assert_eq!(config.storage.projects_dir, PathBuf::from("/tmp/forgecore-projects"));

        // Unspecified fields still take their defaults.
        assert_eq!(config.llm.api_key_env, "ANTHROPIC_API_KEY");
        assert!(config.verification.require_all_checks_passing);
    }

    #[test]
    fn partial_config_uses_defaults_throughout() {
        let yaml = "llm:\n  model: claude-haiku\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.model, "claude-haiku");
        assert_eq!(config.concurrency.max_projects_per_service, 10);
        assert_eq!(config.scheduler.drake_execution_interval_secs, 30);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nonexistent.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn explicit_path_loads_successfully() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forgecore.yml");
        std::fs::write(&path, "llm:\n  model: claude-opus-4\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.llm.model, "claude-opus-4");
    }
}
