//! JSON-backed [`PlanRepository`].

use crate::storage::{DocumentStore, SnapshotFile};
use async_trait::async_trait;
use hourboost_core::error::Result;
use hourboost_core::plan::{Plan, PlanRepository};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlansDocument {
    #[serde(default)]
    pub plans: BTreeMap<String, Plan>,
}

pub struct JsonPlanRepository {
    store: DocumentStore<PlansDocument>,
}

impl JsonPlanRepository {
    pub fn in_memory() -> Self {
        Self::with_plans(Vec::new())
    }

    pub fn with_plans(plans: Vec<Plan>) -> Self {
        let plans = plans.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            store: DocumentStore::memory(PlansDocument { plans }),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: DocumentStore::file(SnapshotFile::new(path)),
        }
    }

    pub async fn list_all(&self) -> Result<Vec<Plan>> {
        self.store
            .read(|doc| doc.plans.values().cloned().collect())
            .await
    }
}

#[async_trait]
impl PlanRepository for JsonPlanRepository {
    async fn get_by_id(&self, plan_id: &str) -> Result<Option<Plan>> {
        let plan_id = plan_id.to_string();
        self.store
            .read(move |doc| doc.plans.get(&plan_id).cloned())
            .await
    }

    async fn get_by_owner(&self, user_id: &str) -> Result<Option<Plan>> {
        let user_id = user_id.to_string();
        self.store
            .read(move |doc| doc.plans.values().find(|p| p.owner_id == user_id).cloned())
            .await
    }

    async fn save(&self, plan: &Plan) -> Result<()> {
        let plan = plan.clone();
        self.store
            .write(move |doc| {
                doc.plans.insert(plan.id.clone(), plan);
            })
            .await
    }
}
