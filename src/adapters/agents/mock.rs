//! Scripted mock agent for tests and dry runs.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::AgentResult;
use crate::domain::ports::AgentCapability;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Success(AgentResult),
    Failure(String),
}

impl MockResponse {
    pub fn success(output: serde_json::Value) -> Self {
        Self::Success(AgentResult::new(output))
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure(error.into())
    }
}

/// A recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub agent_id: String,
    pub input: serde_json::Value,
}

/// Agent that replays scripted responses per agent id.
///
/// When an agent's script is exhausted the default response is returned.
pub struct MockAgent {
    scripts: Arc<Mutex<HashMap<String, VecDeque<MockResponse>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    default_response: MockResponse,
    delay: Option<Duration>,
}

impl MockAgent {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            default_response: MockResponse::Success(AgentResult::default()),
            delay: None,
        }
    }

    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = response;
        self
    }

    /// Sleep this long in every invocation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue responses for an agent id, consumed in order.
    pub async fn script<I>(&self, agent_id: &str, responses: I)
    where
        I: IntoIterator<Item = MockResponse>,
    {
        self.scripts
            .lock()
            .await
            .entry(agent_id.to_string())
            .or_default()
            .extend(responses);
    }

    pub async fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self, agent_id: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.agent_id == agent_id)
            .count()
    }
}

impl Default for MockAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentCapability for MockAgent {
    async fn invoke(&self, agent_id: &str, input: serde_json::Value) -> DomainResult<AgentResult> {
        self.calls.lock().await.push(MockCall {
            agent_id: agent_id.to_string(),
            input,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .scripts
            .lock()
            .await
            .get_mut(agent_id)
            .and_then(VecDeque::pop_front);

        match next.unwrap_or_else(|| self.default_response.clone()) {
            MockResponse::Success(result) => Ok(result),
            MockResponse::Failure(message) => Err(DomainError::AgentInvocation {
                agent: agent_id.to_string(),
                message,
            }),
        }
    }
}
