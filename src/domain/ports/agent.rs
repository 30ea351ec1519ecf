//! Agent capability port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::AgentResult;

/// An external capability a phase delegates to.
///
/// The engine never inspects agent internals; it only sees the returned
/// `AgentResult`. An `Err` is treated like a rejected result and consumes a
/// retry.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    async fn invoke(&self, agent_id: &str, input: serde_json::Value) -> DomainResult<AgentResult>;
}
