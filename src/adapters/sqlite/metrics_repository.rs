//! SQLite implementation of the MetricsRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::adapters::sqlite::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ProcessMetrics;
use crate::domain::ports::MetricsRepository;

const METRICS_COLUMNS: &str = "id, work_id, resource_sid, resource_type, timing, quality, learning, diagnosis, resolution, workflow_used, started_at, completed_at";

#[derive(Clone)]
pub struct SqliteMetricsRepository {
    pool: SqlitePool,
}

impl SqliteMetricsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All records, oldest first.
    pub async fn all(&self) -> DomainResult<Vec<ProcessMetrics>> {
        let rows: Vec<MetricsRow> = sqlx::query_as(&format!(
            "SELECT {METRICS_COLUMNS} FROM process_metrics ORDER BY completed_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl MetricsRepository for SqliteMetricsRepository {
    async fn save(&self, metrics: &ProcessMetrics) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT OR REPLACE INTO process_metrics (id, work_id, category, resource_sid, resource_type, timing, quality, learning, diagnosis, resolution, workflow_used, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(metrics.id.to_string())
        .bind(&metrics.work_id)
        .bind(metrics.category())
        .bind(&metrics.resource_sid)
        .bind(&metrics.resource_type)
        .bind(serde_json::to_string(&metrics.timing)?)
        .bind(serde_json::to_string(&metrics.quality)?)
        .bind(serde_json::to_string(&metrics.learning)?)
        .bind(serde_json::to_string(&metrics.diagnosis)?)
        .bind(&metrics.resolution)
        .bind(&metrics.workflow_used)
        .bind(metrics.started_at.to_rfc3339())
        .bind(metrics.completed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, limit: usize) -> DomainResult<Vec<ProcessMetrics>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<MetricsRow> = sqlx::query_as(&format!(
            "SELECT {METRICS_COLUMNS} FROM process_metrics ORDER BY completed_at DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn by_category(&self, category: &str) -> DomainResult<Vec<ProcessMetrics>> {
        let rows: Vec<MetricsRow> = sqlx::query_as(&format!(
            "SELECT {METRICS_COLUMNS} FROM process_metrics WHERE category = ? ORDER BY completed_at ASC"
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_by_work(&self, work_id: &str) -> DomainResult<Option<ProcessMetrics>> {
        let row: Option<MetricsRow> = sqlx::query_as(&format!(
            "SELECT {METRICS_COLUMNS} FROM process_metrics WHERE work_id = ? ORDER BY completed_at DESC LIMIT 1"
        ))
        .bind(work_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn count(&self) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM process_metrics")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[derive(sqlx::FromRow)]
struct MetricsRow {
    id: String,
    work_id: String,
    resource_sid: Option<String>,
    resource_type: Option<String>,
    timing: String,
    quality: String,
    learning: String,
    diagnosis: String,
    resolution: String,
    workflow_used: String,
    started_at: String,
    completed_at: String,
}

impl TryFrom<MetricsRow> for ProcessMetrics {
    type Error = DomainError;

    fn try_from(row: MetricsRow) -> Result<Self, Self::Error> {
        Ok(ProcessMetrics {
            id: parse_uuid(&row.id)?,
            work_id: row.work_id,
            resource_sid: row.resource_sid,
            resource_type: row.resource_type,
            timing: serde_json::from_str(&row.timing)?,
            quality: serde_json::from_str(&row.quality)?,
            learning: serde_json::from_str(&row.learning)?,
            diagnosis: serde_json::from_str(&row.diagnosis)?,
            resolution: row.resolution,
            workflow_used: row.workflow_used,
            started_at: parse_datetime(&row.started_at)?,
            completed_at: parse_datetime(&row.completed_at)?,
        })
    }
}
