//! Command-backed pre-phase hooks.
//!
//! A `CommandHook` runs a configured program and passes when its exit status
//! matches the configured expectation. Typical uses are "the regression test
//! currently fails" (`expect: failure`) and "coverage is at least N"
//! (`min_coverage`, read from a `COVERAGE=<n>` line on stdout).

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::models::{CommandHookConfig, HookExpectation};
use crate::domain::ports::{HookContext, HookOutcome, PrePhaseHook};

pub struct CommandHook {
    name: String,
    config: CommandHookConfig,
}

impl CommandHook {
    pub fn new(name: impl Into<String>, config: CommandHookConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Substitute `${WORK_ID}`, `${RUN_ID}`, `${PHASE}` and `${WORKFLOW}`.
    fn substitute_variables(value: &str, context: &HookContext) -> String {
        value
            .replace("${WORK_ID}", &context.work_id)
            .replace("${RUN_ID}", &context.run_id.to_string())
            .replace("${PHASE}", &context.phase)
            .replace("${WORKFLOW}", &context.workflow)
    }

    fn evaluate(&self, exit_ok: bool, stdout: &str) -> HookOutcome {
        let status_matches = match self.config.expect {
            HookExpectation::Success => exit_ok,
            HookExpectation::Failure => !exit_ok,
        };
        if !status_matches {
            let wanted = match self.config.expect {
                HookExpectation::Success => "succeed",
                HookExpectation::Failure => "fail",
            };
            return HookOutcome::fail(format!("expected '{}' to {wanted}", self.config.command));
        }

        let Some(min) = self.config.min_coverage else {
            return HookOutcome::pass("exit status as expected");
        };
        match parse_coverage(stdout) {
            Some(coverage) if coverage >= min => {
                HookOutcome::pass(format!("coverage {coverage} >= {min}"))
            }
            Some(coverage) => HookOutcome::fail(format!("coverage {coverage} below {min}")),
            None => HookOutcome::fail("command printed no COVERAGE= line"),
        }
    }
}

/// Last `COVERAGE=<number>` line in the output, `%` suffix allowed.
pub fn parse_coverage(stdout: &str) -> Option<f64> {
    stdout.lines().rev().find_map(|line| {
        line.trim()
            .strip_prefix("COVERAGE=")
            .and_then(|value| value.trim().trim_end_matches('%').parse::<f64>().ok())
    })
}

#[async_trait]
impl PrePhaseHook for CommandHook {
    async fn check(&self, context: &HookContext) -> HookOutcome {
        let command = Self::substitute_variables(&self.config.command, context);
        let args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|arg| Self::substitute_variables(arg, context))
            .collect();

        info!(hook = %self.name, command = %command, phase = %context.phase, "Running pre-phase hook");
        debug!(args = ?args, "Hook arguments");

        let mut cmd = Command::new(&command);
        cmd.args(&args)
            .env("FIXLOOP_WORK_ID", &context.work_id)
            .env("FIXLOOP_RUN_ID", context.run_id.to_string())
            .env("FIXLOOP_PHASE", &context.phase)
            .env("FIXLOOP_ATTEMPT", context.attempt.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let timeout = Duration::from_secs(self.config.timeout_secs.max(1));
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(hook = %self.name, error = %e, "Failed to execute hook command");
                return HookOutcome::fail(format!("failed to execute '{command}': {e}"));
            }
            Err(_) => {
                warn!(hook = %self.name, "Hook command timed out");
                return HookOutcome::fail(format!("'{command}' timed out after {}s", timeout.as_secs()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.stderr.is_empty() {
            debug!(stderr = %String::from_utf8_lossy(&output.stderr), "Hook stderr");
        }

        let outcome = self.evaluate(output.status.success(), &stdout);
        info!(hook = %self.name, passed = outcome.passed, message = %outcome.message, "Hook finished");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn config(command: &str, args: &[&str], expect: HookExpectation) -> CommandHookConfig {
        CommandHookConfig {
            command: command.to_string(),
            args: args.iter().map(|s| (*s).to_string()).collect(),
            expect,
            min_coverage: None,
            working_dir: None,
            timeout_secs: 10,
        }
    }

    fn context() -> HookContext {
        HookContext {
            run_id: Uuid::new_v4(),
            work_id: "work-1".into(),
            workflow: "diagnose-fix-learn".into(),
            phase: "fix".into(),
            attempt: 1,
            input: json!({}),
        }
    }

    #[test]
    fn test_parse_coverage() {
        assert_eq!(parse_coverage("running\nCOVERAGE=81.5\n"), Some(81.5));
        assert_eq!(parse_coverage("COVERAGE=70%\nCOVERAGE=90%"), Some(90.0));
        assert_eq!(parse_coverage("no numbers here"), None);
    }

    #[test]
    fn test_evaluate_expectations() {
        let hook = CommandHook::new("red", config("cargo", &[], HookExpectation::Failure));
        assert!(hook.evaluate(false, "").passed);
        assert!(!hook.evaluate(true, "").passed);

        let mut cfg = config("cov", &[], HookExpectation::Success);
        cfg.min_coverage = Some(80.0);
        let hook = CommandHook::new("coverage", cfg);
        assert!(hook.evaluate(true, "COVERAGE=85").passed);
        assert!(!hook.evaluate(true, "COVERAGE=79.9").passed);
        assert!(!hook.evaluate(true, "").passed);
    }

    #[tokio::test]
    async fn test_runs_command() {
        let ok = CommandHook::new("true", config("sh", &["-c", "exit 0"], HookExpectation::Success));
        assert!(ok.check(&context()).await.passed);

        let red = CommandHook::new("red", config("sh", &["-c", "exit 1"], HookExpectation::Failure));
        assert!(red.check(&context()).await.passed);

        let cov = CommandHook::new(
            "cov",
            CommandHookConfig {
                min_coverage: Some(50.0),
                ..config("sh", &["-c", "echo COVERAGE=${WORK_ID}"], HookExpectation::Success)
            },
        );
        // work id is not a number, so no coverage can be parsed
        assert!(!cov.check(&context()).await.passed);
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let hook = CommandHook::new(
            "missing",
            config("/nonexistent/fixloop-hook", &[], HookExpectation::Success),
        );
        let outcome = hook.check(&context()).await;
        assert!(!outcome.passed);
        assert!(outcome.message.contains("failed to execute"));
    }
}
