//! Workflow run repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{RunStatus, WorkflowRun};

/// Filter for listing runs.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub status: Option<RunStatus>,
    pub work_id: Option<String>,
    pub limit: Option<usize>,
}

/// Repository interface for workflow run persistence.
///
/// Runs are saved on every state change so a suspended run can be resumed
/// by any process sharing the store.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Insert or replace a run.
    async fn save(&self, run: &WorkflowRun) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<WorkflowRun>>;

    /// Runs matching the filter, most recently updated first.
    async fn list(&self, filter: RunFilter) -> DomainResult<Vec<WorkflowRun>>;

    /// The non-terminal run for a work item, if any.
    async fn find_active_for_work(&self, work_id: &str) -> DomainResult<Option<WorkflowRun>>;
}
