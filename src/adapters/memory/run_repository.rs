use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::WorkflowRun;
use crate::domain::ports::{RunFilter, RunRepository};

/// Run repository backed by a map.
#[derive(Default)]
pub struct InMemoryRunRepository {
    runs: RwLock<HashMap<Uuid, WorkflowRun>>,
}

impl InMemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn save(&self, run: &WorkflowRun) -> DomainResult<()> {
        self.runs.write().await.insert(run.id, run.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<WorkflowRun>> {
        Ok(self.runs.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: RunFilter) -> DomainResult<Vec<WorkflowRun>> {
        let runs = self.runs.read().await;
        let mut matching: Vec<WorkflowRun> = runs
            .values()
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .filter(|r| filter.work_id.as_deref().map_or(true, |w| r.work_id == w))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn find_active_for_work(&self, work_id: &str) -> DomainResult<Option<WorkflowRun>> {
        Ok(self
            .runs
            .read()
            .await
            .values()
            .find(|r| r.work_id == work_id && !r.status.is_terminal())
            .cloned())
    }
}
