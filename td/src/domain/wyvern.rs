//! `WyvernAnalysis` - the detailed task graph Wyvern produces from a spec
//! plus Wyrm's recommendation, persisted as `analysis.json` (and rendered
//! to `analysis.md` for humans).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::priority::Priority;

/// One task as Wyvern proposes it, before it becomes a `Task` row in a
/// markdown file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedTask {
    pub title: String,
    pub description: String,
    pub agent_type: String,
    pub priority: Priority,
    /// Titles of other tasks in the same analysis this one depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Filled in by `compute_levels`; 0 until then.
    #[serde(default)]
    pub level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub name: String,
    pub tasks: Vec<AnalyzedTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Structure {
    #[serde(default)]
    pub existing_files: Vec<String>,
    #[serde(default)]
    pub naming_conventions: HashMap<String, String>,
    #[serde(default)]
    pub directory_purposes: HashMap<String, String>,
    #[serde(default)]
    pub file_location_guidelines: HashMap<String, String>,
    #[serde(default)]
    pub architecture_notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WyvernAnalysis {
    pub project_id: String,
    pub areas: Vec<Area>,
    pub total_tasks: usize,
    pub estimated_complexity: String,
    pub analyzed_at: i64,
    pub spec_version_id: String,
    #[serde(default)]
    pub structure: Structure,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("dependency cycle detected involving task {0:?}")]
    Cycle(String),
}

/// Compute `level(t) = 1 + max(level(dep))` over `t`'s dependencies by
/// repeated relaxation, mutating `level` on every task in every area.
/// Dependencies are matched by task title within the whole analysis (titles
/// must be unique across areas for this to be well-defined - Wyvern is
/// expected to produce that, and a duplicate is itself a modelling error
/// the agent should avoid, not one this function silently tolerates).
///
/// Returns `Err` on a cycle; per §4.7/§8 no partial task file should be
/// written when this happens, so callers must check before materializing
/// anything.
pub fn compute_levels(areas: &mut [Area]) -> Result<(), AnalysisError> {
    let mut levels: HashMap<String, u32> = HashMap::new();
    let mut deps: HashMap<String, Vec<String>> = HashMap::new();
    for area in areas.iter() {
        for task in &area.tasks {
            deps.insert(task.title.clone(), task.depends_on.clone());
        }
    }

    let all_titles: Vec<String> = deps.keys().cloned().collect();
    let mut in_progress: std::collections::HashSet<String> = std::collections::HashSet::new();

    fn resolve(
        title: &str,
        deps: &HashMap<String, Vec<String>>,
        levels: &mut HashMap<String, u32>,
        in_progress: &mut std::collections::HashSet<String>,
    ) -> Result<u32, AnalysisError> {
        if let Some(level) = levels.get(title) {
            return Ok(*level);
        }
        if !in_progress.insert(title.to_string()) {
            return Err(AnalysisError::Cycle(title.to_string()));
        }
        let my_deps = deps.get(title).cloned().unwrap_or_default();
        let mut level = 0u32;
        for dep in &my_deps {
            if deps.contains_key(dep) {
                level = level.max(1 + resolve(dep, deps, levels, in_progress)?);
            }
        }
        in_progress.remove(title);
        levels.insert(title.to_string(), level);
        Ok(level)
    }

    for title in &all_titles {
        resolve(title, &deps, &mut levels, &mut in_progress)?;
    }

    for area in areas.iter_mut() {
        for task in area.tasks.iter_mut() {
            task.level = *levels.get(&task.title).unwrap_or(&0);
        }
    }
    Ok(())
}

/// Ensure a `Documentation` area with a level-0, Critical-priority README
/// task exists, inserting one if Wyvern's output omitted it (§4.7 mandates
/// it always be present).
pub fn ensure_readme_task(areas: &mut Vec<Area>) {
    let has_readme = areas
        .iter()
        .find(|a| a.name.eq_ignore_ascii_case("documentation"))
        .map(|a| a.tasks.iter().any(|t| t.title.to_ascii_lowercase().contains("readme")))
        .unwrap_or(false);
    if has_readme {
        return;
    }
    let readme_task = AnalyzedTask {
        title: "Write project README".to_string(),
        description: "Document the generated project's purpose, setup, and usage.".to_string(),
        agent_type: "documentation".to_string(),
        priority: Priority::Critical,
        depends_on: Vec::new(),
        level: 0,
    };
    match areas.iter_mut().find(|a| a.name.eq_ignore_ascii_case("documentation")) {
        Some(area) => area.tasks.push(readme_task),
        None => areas.push(Area { name: "Documentation".to_string(), tasks: vec![readme_task] }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(title: &str, deps: &[&str]) -> AnalyzedTask {
        AnalyzedTask {
            title: title.to_string(),
            description: String::new(),
            agent_type: "backend".to_string(),
            priority: Priority::Medium,
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            level: 0,
        }
    }

    #[test]
    fn levels_relax_over_dependency_chain() {
        let mut areas = vec![Area {
            name: "Backend".to_string(),
            tasks: vec![task("add", &[]), task("list", &["add"]), task("delete", &["add", "list"])],
        }];
        compute_levels(&mut areas).unwrap();
        let tasks = &areas[0].tasks;
        assert_eq!(tasks[0].level, 0);
        assert_eq!(tasks[1].level, 1);
        assert_eq!(tasks[2].level, 2);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut areas = vec![Area { name: "Backend".to_string(), tasks: vec![task("a", &["b"]), task("b", &["a"])] }];
        assert!(matches!(compute_levels(&mut areas), Err(AnalysisError::Cycle(_))));
    }

    #[test]
    fn ensure_readme_task_adds_when_missing() {
        let mut areas = vec![Area { name: "Backend".to_string(), tasks: vec![task("add", &[])] }];
        ensure_readme_task(&mut areas);
        let doc_area = areas.iter().find(|a| a.name == "Documentation").unwrap();
        assert_eq!(doc_area.tasks[0].level, 0);
        assert_eq!(doc_area.tasks[0].priority, Priority::Critical);
    }

    #[test]
    fn ensure_readme_task_noop_when_present() {
        let mut areas = vec![Area {
            name: "Documentation".to_string(),
            tasks: vec![task("Write README for project", &[])],
        }];
        ensure_readme_task(&mut areas);
        assert_eq!(areas[0].tasks.len(), 1);
    }
}
