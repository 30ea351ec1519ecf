//! Registry of agent capabilities keyed by agent id.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Workflow;
use crate::domain::ports::AgentCapability;

#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn AgentCapability>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent_id: impl Into<String>, agent: Arc<dyn AgentCapability>) {
        self.agents.insert(agent_id.into(), agent);
    }

    /// Register one implementation under several ids.
    pub fn register_all<I, S>(&mut self, agent_ids: I, agent: Arc<dyn AgentCapability>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in agent_ids {
            self.register(id, agent.clone());
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<dyn AgentCapability>> {
        self.agents.get(agent_id).cloned()
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Fail with `UnregisteredAgent` for the first phase naming an unknown agent.
    pub fn ensure_registered(&self, workflow: &Workflow) -> DomainResult<()> {
        match workflow.phases().iter().find(|p| !self.contains(&p.agent)) {
            Some(phase) => Err(DomainError::UnregisteredAgent {
                phase: phase.name.clone(),
                agent: phase.agent.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::agents::MockAgent;
    use crate::domain::models::Phase;

    #[test]
    fn test_ensure_registered() {
        let mut registry = AgentRegistry::new();
        registry.register_all(["debugger", "dev"], Arc::new(MockAgent::new()));
        assert_eq!(registry.len(), 2);

        let ok = Workflow::new(
            "wf",
            "",
            vec![Phase::new("diagnose", "debugger"), Phase::new("fix", "dev")],
        )
        .unwrap();
        assert!(registry.ensure_registered(&ok).is_ok());

        let bad = Workflow::new("wf", "", vec![Phase::new("qa", "qa")]).unwrap();
        let err = registry.ensure_registered(&bad).unwrap_err();
        assert!(matches!(&err, DomainError::UnregisteredAgent { agent, .. } if agent == "qa"));
        assert!(err.is_configuration());
    }
}
