//! `Plan` - a Kobold's ordered implementation steps for one task, persisted
//! per (project, task) under `kobold-plans/`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use taskstore::{IndexValue, Record, now_ms};

use super::id::generate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum PlanStatus {
    #[default]
    Planning,
    Ready,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Skipped,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub index: usize,
    pub title: String,
    pub description: String,
    pub status: StepStatus,
    #[serde(default)]
    pub output: Option<String>,
    /// Advisory files the planner expects this step to touch; feeds the
    /// shared planning context's file-conflict advisory.
    #[serde(default)]
    pub files_to_modify: Vec<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl PlanStep {
    pub fn new(index: usize, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            description: description.into(),
            status: StepStatus::Pending,
            output: None,
            files_to_modify: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub project_id: String,
    pub task_id: String,
    pub agent_type: String,
    pub spec_version_id: String,
    pub status: PlanStatus,
    pub current_step_index: usize,
    pub steps: Vec<PlanStep>,
    pub log: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Plan {
    pub fn new(project_id: impl Into<String>, task_id: impl Into<String>, agent_type: impl Into<String>, spec_version_id: impl Into<String>) -> Self {
        let now = now_ms();
        let project_id = project_id.into();
        let task_id = task_id.into();
        Self {
            plan_id: generate_id("plan"),
            project_id,
            task_id,
            agent_type: agent_type.into(),
            spec_version_id: spec_version_id.into(),
            status: PlanStatus::Planning,
            current_step_index: 0,
            steps: Vec::new(),
            log: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn log_event(&mut self, message: impl Into<String>) {
        self.log.push(message.into());
        self.updated_at = now_ms();
    }

    /// Replace the step list wholesale (used when the Kobold planner first
    /// decomposes a task, or after a spec-version invalidation recreates
    /// the plan from scratch).
    pub fn set_steps(&mut self, steps: Vec<PlanStep>) {
        self.steps = steps;
        self.current_step_index = 0;
        self.status = if self.steps.is_empty() { PlanStatus::Planning } else { PlanStatus::Ready };
        self.updated_at = now_ms();
    }

    pub fn remaining_steps(&self) -> &[PlanStep] {
        self.steps.get(self.current_step_index..).unwrap_or(&[])
    }

    /// Apply a status update to `step_index`. `current_step_index` only
    /// advances past a step that completed or was skipped - never past a
    /// failure (invariant b, §3).
    pub fn update_step(&mut self, step_index: usize, status: StepStatus, output: Option<String>) {
        let now = now_ms();
        if let Some(step) = self.steps.get_mut(step_index) {
            step.status = status;
            if let Some(output) = output {
                step.output = Some(output);
            }
            match status {
                StepStatus::InProgress => step.started_at.get_or_insert(now),
                _ => step.completed_at.get_or_insert(now),
            };
        }
        if step_index == self.current_step_index && matches!(status, StepStatus::Completed | StepStatus::Skipped) {
            self.current_step_index += 1;
        }
        self.recompute_status();
        self.updated_at = now;
    }

    /// Invariant (a): `status = Completed` iff every step is terminal.
    fn recompute_status(&mut self) {
        if self.status == PlanStatus::Failed {
            return;
        }
        if !self.steps.is_empty() && self.steps.iter().all(|s| s.status.is_terminal()) {
            self.status = PlanStatus::Completed;
        } else if self.status == PlanStatus::Ready && self.steps.iter().any(|s| s.status != StepStatus::Pending) {
            self.status = PlanStatus::InProgress;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == PlanStatus::Completed
    }

    /// Advisory file hints for the step currently in flight (or the next
    /// pending one, if none is in progress).
    pub fn active_files_hint(&self) -> Vec<String> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::InProgress)
            .or_else(|| self.steps.get(self.current_step_index))
            .map(|s| s.files_to_modify.clone())
            .unwrap_or_default()
    }
}

impl Record for Plan {
    fn id(&self) -> &str {
        &self.plan_id
    }

    fn kind(&self) -> &str {
        "plan"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("project_id".to_string(), IndexValue::String(self.project_id.clone()));
        fields.insert("task_id".to_string(), IndexValue::String(self.task_id.clone()));
        fields.insert("status".to_string(), IndexValue::String(format!("{:?}", self.status)));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with_steps(n: usize) -> Plan {
        let mut plan = Plan::new("p1", "t1", "backend", "v1");
        plan.set_steps((0..n).map(|i| PlanStep::new(i, format!("step {i}"), "")).collect());
        plan
    }

    #[test]
    fn completes_only_when_every_step_terminal() {
        let mut plan = plan_with_steps(2);
        plan.update_step(0, StepStatus::Completed, None);
        assert_ne!(plan.status, PlanStatus::Completed);
        assert_eq!(plan.current_step_index, 1);

        plan.update_step(1, StepStatus::Skipped, None);
        assert_eq!(plan.status, PlanStatus::Completed);
        assert_eq!(plan.current_step_index, 2);
    }

    #[test]
    fn failed_step_does_not_advance_index() {
        let mut plan = plan_with_steps(2);
        plan.update_step(0, StepStatus::Failed, None);
        assert_eq!(plan.current_step_index, 0);
        // A failed step is terminal but the plan is not Completed unless
        // every step is terminal; here step 1 is still Pending.
        assert_ne!(plan.status, PlanStatus::Completed);
    }

    #[test]
    fn all_failed_or_skipped_still_completes() {
        let mut plan = plan_with_steps(2);
        plan.update_step(0, StepStatus::Failed, None);
        plan.update_step(1, StepStatus::Skipped, None);
        assert_eq!(plan.status, PlanStatus::Completed);
    }
}
