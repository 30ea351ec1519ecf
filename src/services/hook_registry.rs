//! Hook Registry Service
//!
//! Maps hook identifiers to implementations and runs a phase's hooks in order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CommandHookConfig, Workflow};
use crate::domain::ports::{HookContext, PrePhaseHook};
use crate::services::hook_executor::CommandHook;

/// First failing hook of a phase attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookFailure {
    pub hook: String,
    pub message: String,
}

/// Registry of named pre-phase hooks
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn PrePhaseHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry of command hooks from configuration.
    pub fn from_config(hooks: &BTreeMap<String, CommandHookConfig>) -> Self {
        let mut registry = Self::new();
        for (name, config) in hooks {
            info!(hook = %name, command = %config.command, "Registering command hook");
            registry.register(name.clone(), Arc::new(CommandHook::new(name.clone(), config.clone())));
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, hook: Arc<dyn PrePhaseHook>) {
        self.hooks.insert(name.into(), hook);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.hooks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Fail with `UnknownHook` if any phase references an unregistered hook.
    pub fn ensure_known(&self, workflow: &Workflow) -> DomainResult<()> {
        for phase in workflow.phases() {
            if let Some(missing) = phase.pre_phase_hooks.iter().find(|h| !self.contains(h)) {
                return Err(DomainError::UnknownHook {
                    phase: phase.name.clone(),
                    hook: missing.clone(),
                });
            }
        }
        Ok(())
    }

    /// Run hooks in order, stopping at the first failure.
    #[instrument(skip(self, context), fields(work_id = %context.work_id, phase = %context.phase))]
    pub async fn run_hooks(&self, names: &[String], context: &HookContext) -> Result<(), HookFailure> {
        for name in names {
            let Some(hook) = self.hooks.get(name) else {
                return Err(HookFailure {
                    hook: name.clone(),
                    message: "hook is not registered".to_string(),
                });
            };
            let outcome = hook.check(context).await;
            debug!(hook = %name, passed = outcome.passed, "Hook result");
            if !outcome.passed {
                return Err(HookFailure {
                    hook: name.clone(),
                    message: outcome.message,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Phase;
    use crate::domain::ports::HookOutcome;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingHook {
        passed: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PrePhaseHook for CountingHook {
        async fn check(&self, _context: &HookContext) -> HookOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.passed {
                HookOutcome::pass("ok")
            } else {
                HookOutcome::fail("tests already pass")
            }
        }
    }

    fn context() -> HookContext {
        HookContext {
            run_id: Uuid::new_v4(),
            work_id: "work-1".into(),
            workflow: "wf".into(),
            phase: "fix".into(),
            attempt: 1,
            input: json!({}),
        }
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let failing = Arc::new(CountingHook {
            passed: false,
            calls: AtomicUsize::new(0),
        });
        let after = Arc::new(CountingHook {
            passed: true,
            calls: AtomicUsize::new(0),
        });
        let mut registry = HookRegistry::new();
        registry.register("tdd-red", failing.clone());
        registry.register("coverage", after.clone());

        let err = registry
            .run_hooks(&["tdd-red".to_string(), "coverage".to_string()], &context())
            .await
            .unwrap_err();
        assert_eq!(err.hook, "tdd-red");
        assert_eq!(err.message, "tests already pass");
        assert_eq!(after.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ensure_known() {
        let mut registry = HookRegistry::new();
        registry.register(
            "tdd-red",
            Arc::new(CountingHook {
                passed: true,
                calls: AtomicUsize::new(0),
            }),
        );
        let ok = Workflow::new("wf", "", vec![Phase::new("fix", "dev").with_hooks(["tdd-red"])]).unwrap();
        assert!(registry.ensure_known(&ok).is_ok());

        let bad = Workflow::new("wf", "", vec![Phase::new("fix", "dev").with_hooks(["lint"])]).unwrap();
        assert!(matches!(
            registry.ensure_known(&bad),
            Err(DomainError::UnknownHook { hook, .. }) if hook == "lint"
        ));
    }

    #[test]
    fn test_from_config() {
        let mut hooks = BTreeMap::new();
        hooks.insert(
            "tdd-red".to_string(),
            CommandHookConfig {
                command: "cargo".into(),
                args: vec!["test".into()],
                expect: crate::domain::models::HookExpectation::Failure,
                min_coverage: None,
                working_dir: None,
                timeout_secs: 60,
            },
        );
        let registry = HookRegistry::from_config(&hooks);
        assert_eq!(registry.names(), vec!["tdd-red"]);
    }
}
