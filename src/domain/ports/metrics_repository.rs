use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::ProcessMetrics;

/// Durable store for completed cycle metrics.
#[async_trait]
pub trait MetricsRepository: Send + Sync {
    async fn save(&self, metrics: &ProcessMetrics) -> DomainResult<()>;

    /// Most recently completed first.
    async fn recent(&self, limit: usize) -> DomainResult<Vec<ProcessMetrics>>;

    async fn by_category(&self, category: &str) -> DomainResult<Vec<ProcessMetrics>>;

    async fn get_by_work(&self, work_id: &str) -> DomainResult<Option<ProcessMetrics>>;

    async fn count(&self) -> DomainResult<u64>;
}
