//! `Drake` - supervisor state for one task file: which kobold (if any) is
//! currently mapped to which task. Drakes are not persisted through
//! `taskstore` - their lifetime is the lifetime of the task file, and they
//! are reconstructed by the Drake-execution worker each cycle from the
//! task file plus the live kobold registry.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct DrakeInfo {
    pub name: String,
    pub task_file_path: String,
    pub project_id: String,
    /// task id -> kobold id
    pub workers: HashMap<String, String>,
}

impl DrakeInfo {
    pub fn new(name: impl Into<String>, task_file_path: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task_file_path: task_file_path.into(),
            project_id: project_id.into(),
            workers: HashMap::new(),
        }
    }
}
