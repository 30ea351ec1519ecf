//! Domain errors for the fixloop engine.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the diagnose-fix-learn engine.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Workflow '{0}' has no phases")]
    EmptyWorkflow(String),

    #[error("Workflow '{workflow}' defines phase '{phase}' more than once")]
    DuplicatePhase { workflow: String, phase: String },

    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("Phase '{phase}' references unregistered agent '{agent}'")]
    UnregisteredAgent { phase: String, agent: String },

    #[error("Phase '{phase}' references unknown hook '{hook}'")]
    UnknownHook { phase: String, hook: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("A workflow run is already active for work {0}")]
    RunAlreadyActive(String),

    #[error("Workflow run {0} is not awaiting approval")]
    NotAwaitingApproval(Uuid),

    #[error("Work {0} is already queued")]
    DuplicateWork(String),

    #[error("Work not found: {0}")]
    WorkNotFound(String),

    #[error("Workflow run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Unknown cycle for work {0}")]
    UnknownCycle(String),

    #[error("Work {0} has no diagnosis")]
    MissingDiagnosis(String),

    #[error("Agent '{agent}' invocation failed: {message}")]
    AgentInvocation { agent: String, message: String },

    #[error("Diagnostic analyzer failed: {0}")]
    AnalyzerFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether this error belongs to the configuration class, which must fail
    /// before any run starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::EmptyWorkflow(_)
                | Self::DuplicatePhase { .. }
                | Self::UnknownWorkflow(_)
                | Self::UnregisteredAgent { .. }
                | Self::UnknownHook { .. }
                | Self::InvalidConfiguration(_)
        )
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(DomainError::EmptyWorkflow("wf".into()).is_configuration());
        assert!(DomainError::UnregisteredAgent {
            phase: "fix".into(),
            agent: "dev".into()
        }
        .is_configuration());
        assert!(!DomainError::UnknownCycle("w-1".into()).is_configuration());
        assert!(!DomainError::RunNotFound(Uuid::new_v4()).is_configuration());
    }

    #[test]
    fn test_error_messages() {
        let err = DomainError::UnregisteredAgent {
            phase: "fix".into(),
            agent: "dev".into(),
        };
        assert_eq!(
            err.to_string(),
            "Phase 'fix' references unregistered agent 'dev'"
        );
        assert_eq!(
            DomainError::UnknownCycle("w-1".into()).to_string(),
            "Unknown cycle for work w-1"
        );
    }
}
