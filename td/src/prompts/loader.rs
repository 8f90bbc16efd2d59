//! Loads and renders system prompt templates, falling back through a
//! project override to the embedded default.
//!
//! Load chain:
//! 1. `.forgecore/prompts/{name}.pmt` (project override)
//! 2. `prompts/{name}.pmt` (repo default, checked into the project)
//! 3. Embedded fallback compiled into the binary

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

pub struct PromptLoader {
    hbs: Handlebars<'static>,
    user_dir: Option<PathBuf>,
    repo_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// `worktree` is searched for `.forgecore/prompts/` and `prompts/`.
    pub fn new(worktree: impl AsRef<Path>) -> Self {
        let worktree = worktree.as_ref();
        let user_dir = worktree.join(".forgecore/prompts");
        let repo_dir = worktree.join("prompts");
        Self {
            hbs: Handlebars::new(),
            user_dir: user_dir.exists().then_some(user_dir),
            repo_dir: repo_dir.exists().then_some(repo_dir),
        }
    }

    /// A loader with no override directories - embedded prompts only.
    pub fn embedded_only() -> Self {
        Self { hbs: Handlebars::new(), user_dir: None, repo_dir: None }
    }

    fn load_template(&self, name: &str) -> Result<String> {
        for dir in [&self.user_dir, &self.repo_dir].into_iter().flatten() {
            let path = dir.join(format!("{name}.pmt"));
            if path.exists() {
                debug!(?path, "prompt loader: found override");
                return std::fs::read_to_string(&path).map_err(|e| eyre!("failed to read prompt override {}: {e}", path.display()));
            }
        }

        embedded::get_embedded(name).map(str::to_string).ok_or_else(|| eyre!("prompt template not found: {name}"))
    }

    /// Renders `name` with `context` substituted via Handlebars. `context`
    /// is typically `serde_json::json!({})` for prompts with no variables.
    pub fn render(&self, name: &str, context: &impl Serialize) -> Result<String> {
        let template = self.load_template(name)?;
        self.hbs.render_template(&template, context).map_err(|e| eyre!("failed to render prompt template {name}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn embedded_only_renders_the_dragon_prompt_unchanged() {
        let loader = PromptLoader::embedded_only();
        let rendered = loader.render("dragon", &json!({})).unwrap();
        assert!(rendered.contains("Dragon"));
    }

    #[test]
    fn embedded_kobold_prompt_substitutes_agent_type() {
        let loader = PromptLoader::embedded_only();
        let rendered = loader.render("kobold", &json!({"agent_type": "backend"})).unwrap();
        assert!(rendered.contains("backend implementation agent"));
    }

    #[test]
    fn unknown_template_without_override_errors() {
        let loader = PromptLoader::embedded_only();
        assert!(loader.render("nonexistent", &json!({})).is_err());
    }

    #[test]
    fn project_override_takes_precedence_over_embedded() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("prompts")).unwrap();
        std::fs::write(dir.path().join("prompts/kobold.pmt"), "Custom {{agent_type}} prompt").unwrap();

        let loader = PromptLoader::new(dir.path());
        let rendered = loader.render("kobold", &json!({"agent_type": "frontend"})).unwrap();
        assert_eq!(rendered, "Custom frontend prompt");
    }

    #[test]
    fn user_override_takes_precedence_over_repo_default() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".forgecore/prompts")).unwrap();
        std::fs::create_dir_all(dir.path().join("prompts")).unwrap();
        std::fs::write(dir.path().join(".forgecore/prompts/kobold.pmt"), "User override").unwrap();
        std::fs::write(dir.path().join("prompts/kobold.pmt"), "Repo default").unwrap();

        let loader = PromptLoader::new(dir.path());
        assert_eq!(loader.render("kobold", &json!({})).unwrap(), "User override");
    }
}
