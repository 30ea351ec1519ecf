//! Ports used by the work poller.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DiscoveredWork, FailureSignal};

/// A source polled on every tick, in addition to subscribed channels.
#[async_trait]
pub trait ExternalPoller: Send + Sync {
    fn name(&self) -> &str;

    async fn poll(&self) -> DomainResult<Vec<FailureSignal>>;
}

/// Receives work the poller starts automatically.
#[async_trait]
pub trait WorkHandler: Send + Sync {
    async fn handle(&self, work: DiscoveredWork) -> DomainResult<()>;
}
