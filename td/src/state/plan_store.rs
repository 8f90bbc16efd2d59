//! The plan store (§4.4, §5): the only writer of `*-plan.json` files.
//! Backed by a [`Store<Plan>`], keyed by `plan_id`, queried by
//! `(project_id, task_id)` through its indexed fields.

use std::sync::Arc;

use async_trait::async_trait;
use taskstore::{Filter, IndexValue, Store};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::agent::PlanRepository;
use crate::domain::Plan;

pub struct PlanStore {
    store: Store<Plan>,
}

impl PlanStore {
    pub fn open(dir: impl AsRef<std::path::Path>) -> eyre::Result<Self> {
        Ok(Self { store: Store::open(dir)? })
    }

    fn find(&self, project_id: &str, task_id: &str) -> Option<Plan> {
        let filters =
            vec![Filter::eq("project_id", IndexValue::String(project_id.to_string())), Filter::eq("task_id", IndexValue::String(task_id.to_string()))];
        self.store.query(&filters).into_iter().next()
    }
}

#[async_trait]
impl PlanRepository for PlanStore {
    async fn load_or_create(&self, project_id: &str, task_id: &str, agent_type: &str, spec_version_id: &str) -> Arc<Mutex<Plan>> {
        match self.find(project_id, task_id) {
            Some(plan) if plan.spec_version_id == spec_version_id => {
                debug!(project_id, task_id, "plan store: reusing persisted plan");
                Arc::new(Mutex::new(plan))
            }
            Some(stale) => {
                warn!(project_id, task_id, plan_version = %stale.spec_version_id, current_version = %spec_version_id, "plan store: spec version changed, recreating plan");
                let mut plan = Plan::new(project_id, task_id, agent_type, spec_version_id);
                plan.log_event(format!("spec version changed {}→{}, regenerating", stale.spec_version_id, spec_version_id));
                Arc::new(Mutex::new(plan))
            }
            None => Arc::new(Mutex::new(Plan::new(project_id, task_id, agent_type, spec_version_id))),
        }
    }

    async fn save(&self, plan: &Plan) {
        if let Err(e) = self.store.put(plan.clone()) {
            warn!(plan_id = %plan.plan_id, error = %e, "plan store: failed to persist plan");
        }
    }
}
