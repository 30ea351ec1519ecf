//! Pre-phase hook port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a hook sees about the attempt it guards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookContext {
    pub run_id: Uuid,
    pub work_id: String,
    pub workflow: String,
    pub phase: String,
    pub attempt: u32,
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookOutcome {
    pub passed: bool,
    pub message: String,
}

impl HookOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

/// A named precondition checked before each phase attempt.
///
/// A failing hook aborts the attempt without invoking the agent and counts
/// like a failed validation.
#[async_trait]
pub trait PrePhaseHook: Send + Sync {
    async fn check(&self, context: &HookContext) -> HookOutcome;
}
