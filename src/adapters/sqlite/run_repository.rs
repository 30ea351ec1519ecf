//! SQLite implementation of the RunRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{RunStatus, WorkflowRun};
use crate::domain::ports::{RunFilter, RunRepository};

const RUN_COLUMNS: &str = "id, workflow_name, work_id, status, current_phase, total_phases, current_input, history, retry_counts, last_result, reason, created_at, updated_at, completed_at";

#[derive(Clone)]
pub struct SqliteRunRepository {
    pool: SqlitePool,
}

impl SqliteRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunRepository for SqliteRunRepository {
    async fn save(&self, run: &WorkflowRun) -> DomainResult<()> {
        let current_input = serde_json::to_string(&run.current_input)?;
        let history = serde_json::to_string(&run.history)?;
        let retry_counts = serde_json::to_string(&run.retry_counts)?;
        let last_result = run.last_result.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO workflow_runs (id, workflow_name, work_id, status, current_phase, total_phases, current_input, history, retry_counts, last_result, reason, created_at, updated_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   status = excluded.status,
                   current_phase = excluded.current_phase,
                   current_input = excluded.current_input,
                   history = excluded.history,
                   retry_counts = excluded.retry_counts,
                   last_result = excluded.last_result,
                   reason = excluded.reason,
                   updated_at = excluded.updated_at,
                   completed_at = excluded.completed_at"#
        )
        .bind(run.id.to_string())
        .bind(&run.workflow_name)
        .bind(&run.work_id)
        .bind(run.status.as_str())
        .bind(i64::try_from(run.current_phase).unwrap_or(i64::MAX))
        .bind(i64::try_from(run.total_phases).unwrap_or(i64::MAX))
        .bind(&current_input)
        .bind(&history)
        .bind(&retry_counts)
        .bind(last_result)
        .bind(&run.reason)
        .bind(run.created_at.to_rfc3339())
        .bind(run.updated_at.to_rfc3339())
        .bind(run.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<WorkflowRun>> {
        let row: Option<RunRow> = sqlx::query_as(&format!("SELECT {RUN_COLUMNS} FROM workflow_runs WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filter: RunFilter) -> DomainResult<Vec<WorkflowRun>> {
        let mut query = format!("SELECT {RUN_COLUMNS} FROM workflow_runs WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }

        if let Some(work_id) = &filter.work_id {
            query.push_str(" AND work_id = ?");
            bindings.push(work_id.clone());
        }

        query.push_str(" ORDER BY updated_at DESC");

        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_as::<_, RunRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<RunRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_active_for_work(&self, work_id: &str) -> DomainResult<Option<WorkflowRun>> {
        let row: Option<RunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM workflow_runs WHERE work_id = ? AND status NOT IN ('completed', 'failed', 'escalated') ORDER BY updated_at DESC LIMIT 1"
        ))
        .bind(work_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    workflow_name: String,
    work_id: String,
    status: String,
    current_phase: i64,
    total_phases: i64,
    current_input: String,
    history: String,
    retry_counts: String,
    last_result: Option<String>,
    reason: Option<String>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

fn to_index(value: i64, column: &str) -> DomainResult<usize> {
    usize::try_from(value)
        .map_err(|_| DomainError::SerializationError(format!("Invalid {column}: {value}")))
}

impl TryFrom<RunRow> for WorkflowRun {
    type Error = DomainError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let status: RunStatus = row
            .status
            .parse()
            .map_err(|_| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;

        Ok(WorkflowRun {
            id: parse_uuid(&row.id)?,
            workflow_name: row.workflow_name,
            work_id: row.work_id,
            status,
            current_phase: to_index(row.current_phase, "current_phase")?,
            total_phases: to_index(row.total_phases, "total_phases")?,
            current_input: serde_json::from_str(&row.current_input)?,
            history: serde_json::from_str(&row.history)?,
            retry_counts: serde_json::from_str(&row.retry_counts)?,
            last_result: row.last_result.map(|s| serde_json::from_str(&s)).transpose()?,
            reason: row.reason,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
        })
    }
}
