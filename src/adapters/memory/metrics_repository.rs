use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::DomainResult;
use crate::domain::models::ProcessMetrics;
use crate::domain::ports::MetricsRepository;

/// Unbounded metrics store kept in insertion order.
#[derive(Default)]
pub struct InMemoryMetricsRepository {
    records: RwLock<Vec<ProcessMetrics>>,
}

impl InMemoryMetricsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricsRepository for InMemoryMetricsRepository {
    async fn save(&self, metrics: &ProcessMetrics) -> DomainResult<()> {
        self.records.write().await.push(metrics.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> DomainResult<Vec<ProcessMetrics>> {
        Ok(self.records.read().await.iter().rev().take(limit).cloned().collect())
    }

    async fn by_category(&self, category: &str) -> DomainResult<Vec<ProcessMetrics>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|m| m.category() == category)
            .cloned()
            .collect())
    }

    async fn get_by_work(&self, work_id: &str) -> DomainResult<Option<ProcessMetrics>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .rev()
            .find(|m| m.work_id == work_id)
            .cloned())
    }

    async fn count(&self) -> DomainResult<u64> {
        Ok(self.records.read().await.len() as u64)
    }
}
