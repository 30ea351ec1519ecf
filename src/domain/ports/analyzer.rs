use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Diagnosis, ValidationResult};

/// Derives a diagnosis for failure signals that arrive without one.
#[async_trait]
pub trait DiagnosticAnalyzer: Send + Sync {
    async fn analyze(&self, result: &ValidationResult) -> DomainResult<Diagnosis>;
}
