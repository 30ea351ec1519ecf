//! Workflow and phase domain models.
//!
//! A `Workflow` is an immutable, ordered list of `Phase`s built once at process
//! start, either in code or from a declarative `WorkflowSpec`. Each phase names
//! the agent capability it delegates to, how its output is validated and how
//! that output becomes the next phase's input.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::agent_result::AgentResult;

// ============================================================================
// Phase kinds
// ============================================================================

/// What role a phase plays in the diagnose-fix-learn cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Diagnose,
    Fix,
    Validate,
    Learn,
    Review,
    #[default]
    Other,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Diagnose => "diagnose",
            Self::Fix => "fix",
            Self::Validate => "validate",
            Self::Learn => "learn",
            Self::Review => "review",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Decides whether a phase's output is acceptable.
///
/// Returns `Err(reason)` when the output is rejected.
pub trait OutputValidator: Send + Sync {
    fn validate(&self, result: &AgentResult) -> Result<(), String>;
}

/// Adapter turning a boolean predicate into an `OutputValidator`.
pub struct FnValidator<F>(pub F);

impl<F> OutputValidator for FnValidator<F>
where
    F: Fn(&AgentResult) -> bool + Send + Sync,
{
    fn validate(&self, result: &AgentResult) -> Result<(), String> {
        if (self.0)(result) {
            Ok(())
        } else {
            Err("output rejected by validation predicate".to_string())
        }
    }
}

/// Declarative validation rules usable from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationRule {
    #[default]
    Always,
    /// Every listed top-level output field is present and non-null.
    RequiredFields { fields: Vec<String> },
    /// A top-level output field equals the given value.
    FieldEquals {
        field: String,
        value: serde_json::Value,
    },
    /// At least one file was created or modified.
    HasChanges,
    /// At least one commit was produced.
    HasCommits,
    AllOf { rules: Vec<ValidationRule> },
}

impl OutputValidator for ValidationRule {
    fn validate(&self, result: &AgentResult) -> Result<(), String> {
        match self {
            Self::Always => Ok(()),
            Self::RequiredFields { fields } => {
                let missing: Vec<&str> = fields
                    .iter()
                    .filter(|f| result.field(f).map_or(true, serde_json::Value::is_null))
                    .map(String::as_str)
                    .collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(format!("missing required output fields: {}", missing.join(", ")))
                }
            }
            Self::FieldEquals { field, value } => match result.field(field) {
                Some(actual) if actual == value => Ok(()),
                Some(actual) => Err(format!("field '{field}' is {actual}, expected {value}")),
                None => Err(format!("field '{field}' is missing")),
            },
            Self::HasChanges => {
                if result.has_changes() {
                    Ok(())
                } else {
                    Err("phase produced no file changes".to_string())
                }
            }
            Self::HasCommits => {
                if result.commits.is_empty() {
                    Err("phase produced no commits".to_string())
                } else {
                    Ok(())
                }
            }
            Self::AllOf { rules } => rules.iter().try_for_each(|rule| rule.validate(result)),
        }
    }
}

// ============================================================================
// Next-phase input mapping
// ============================================================================

/// Computes the next phase's input from a successful phase result.
pub trait InputMapper: Send + Sync {
    fn next_input(&self, result: &AgentResult, current_input: &serde_json::Value)
        -> serde_json::Value;
}

/// Adapter turning a closure into an `InputMapper`.
pub struct FnMapper<F>(pub F);

impl<F> InputMapper for FnMapper<F>
where
    F: Fn(&AgentResult) -> serde_json::Value + Send + Sync,
{
    fn next_input(&self, result: &AgentResult, _current_input: &serde_json::Value) -> serde_json::Value {
        (self.0)(result)
    }
}

/// Declarative input mappings usable from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputMapping {
    /// The whole agent result becomes the next input.
    #[default]
    Identity,
    /// Only one top-level output field is passed on (null when absent).
    SelectField { field: String },
    /// The current input object, overlaid with the output's top-level fields.
    MergeWithInput,
}

/// The identity mapping: the serialized agent result.
pub fn identity_input(result: &AgentResult) -> serde_json::Value {
    serde_json::to_value(result).unwrap_or_default()
}

impl InputMapper for InputMapping {
    fn next_input(&self, result: &AgentResult, current_input: &serde_json::Value) -> serde_json::Value {
        match self {
            Self::Identity => identity_input(result),
            Self::SelectField { field } => result
                .field(field)
                .cloned()
                .unwrap_or(serde_json::Value::Null),
            Self::MergeWithInput => {
                let mut merged = match current_input {
                    serde_json::Value::Object(map) => map.clone(),
                    serde_json::Value::Null => serde_json::Map::new(),
                    other => {
                        let mut map = serde_json::Map::new();
                        map.insert("input".to_string(), other.clone());
                        map
                    }
                };
                match &result.output {
                    serde_json::Value::Object(output) => {
                        for (k, v) in output {
                            merged.insert(k.clone(), v.clone());
                        }
                    }
                    other => {
                        merged.insert("output".to_string(), other.clone());
                    }
                }
                serde_json::Value::Object(merged)
            }
        }
    }
}

// ============================================================================
// Phase & Workflow
// ============================================================================

/// One step of a workflow, bound to one agent capability.
#[derive(Clone)]
pub struct Phase {
    pub name: String,
    pub agent: String,
    pub kind: PhaseKind,
    pub approval_required: bool,
    pub max_retries: u32,
    pub pre_phase_hooks: Vec<String>,
    validation: Arc<dyn OutputValidator>,
    next_phase_input: Option<Arc<dyn InputMapper>>,
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Phase")
            .field("name", &self.name)
            .field("agent", &self.agent)
            .field("kind", &self.kind)
            .field("approval_required", &self.approval_required)
            .field("max_retries", &self.max_retries)
            .field("pre_phase_hooks", &self.pre_phase_hooks)
            .field("custom_next_input", &self.next_phase_input.is_some())
            .finish_non_exhaustive()
    }
}

impl Phase {
    /// A phase that accepts any output, never retries and needs no approval.
    pub fn new(name: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent: agent.into(),
            kind: PhaseKind::Other,
            approval_required: false,
            max_retries: 0,
            pre_phase_hooks: Vec::new(),
            validation: Arc::new(ValidationRule::Always),
            next_phase_input: None,
        }
    }

    pub fn with_kind(mut self, kind: PhaseKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn requires_approval(mut self) -> Self {
        self.approval_required = true;
        self
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_hooks<I, S>(mut self, hooks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pre_phase_hooks = hooks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_validation(mut self, validator: impl OutputValidator + 'static) -> Self {
        self.validation = Arc::new(validator);
        self
    }

    /// Validate with a boolean predicate.
    pub fn validate_with<F>(self, predicate: F) -> Self
    where
        F: Fn(&AgentResult) -> bool + Send + Sync + 'static,
    {
        self.with_validation(FnValidator(predicate))
    }

    pub fn with_next_input(mut self, mapper: impl InputMapper + 'static) -> Self {
        self.next_phase_input = Some(Arc::new(mapper));
        self
    }

    /// Map the next input with a closure over the agent result.
    pub fn map_next_input<F>(self, mapper: F) -> Self
    where
        F: Fn(&AgentResult) -> serde_json::Value + Send + Sync + 'static,
    {
        self.with_next_input(FnMapper(mapper))
    }

    pub fn validate(&self, result: &AgentResult) -> Result<(), String> {
        self.validation.validate(result)
    }

    /// Input for the following phase; the identity mapping when unset.
    pub fn next_input(&self, result: &AgentResult, current_input: &serde_json::Value) -> serde_json::Value {
        match &self.next_phase_input {
            Some(mapper) => mapper.next_input(result, current_input),
            None => identity_input(result),
        }
    }
}

/// Immutable ordered sequence of phases.
#[derive(Debug, Clone)]
pub struct Workflow {
    name: String,
    description: String,
    phases: Vec<Phase>,
}

impl Workflow {
    /// Build a workflow. An empty phase list or a repeated phase name is a
    /// configuration error; retry budgets and history are keyed by phase name.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        phases: Vec<Phase>,
    ) -> DomainResult<Self> {
        let name = name.into();
        if phases.is_empty() {
            return Err(DomainError::EmptyWorkflow(name));
        }
        let duplicate = {
            let mut seen = HashSet::new();
            phases
                .iter()
                .find(|p| !seen.insert(p.name.as_str()))
                .map(|p| p.name.clone())
        };
        if let Some(phase) = duplicate {
            return Err(DomainError::DuplicatePhase { workflow: name, phase });
        }
        Ok(Self {
            name,
            description: description.into(),
            phases,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn phase(&self, index: usize) -> Option<&Phase> {
        self.phases.get(index)
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

// ============================================================================
// Declarative specs
// ============================================================================

/// Serializable phase definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub name: String,
    pub agent: String,
    #[serde(default)]
    pub kind: PhaseKind,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub pre_phase_hooks: Vec<String>,
    #[serde(default)]
    pub validation: ValidationRule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_input: Option<InputMapping>,
}

impl PhaseSpec {
    fn new(name: &str, agent: &str, kind: PhaseKind, validation: ValidationRule) -> Self {
        Self {
            name: name.to_string(),
            agent: agent.to_string(),
            kind,
            approval_required: false,
            max_retries: 0,
            pre_phase_hooks: Vec::new(),
            validation,
            next_input: None,
        }
    }

    fn retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    fn approval(mut self) -> Self {
        self.approval_required = true;
        self
    }

    pub fn build(&self) -> Phase {
        let mut phase = Phase::new(&self.name, &self.agent)
            .with_kind(self.kind)
            .with_retries(self.max_retries)
            .with_hooks(self.pre_phase_hooks.iter().cloned())
            .with_validation(self.validation.clone());
        if self.approval_required {
            phase = phase.requires_approval();
        }
        if let Some(mapping) = &self.next_input {
            phase = phase.with_next_input(mapping.clone());
        }
        phase
    }
}

/// Serializable workflow definition, loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub phases: Vec<PhaseSpec>,
}

impl WorkflowSpec {
    pub fn build(&self) -> DomainResult<Workflow> {
        Workflow::new(
            &self.name,
            &self.description,
            self.phases.iter().map(PhaseSpec::build).collect(),
        )
    }
}

/// Name of the default workflow for detected failures.
pub const DIAGNOSE_FIX_LEARN: &str = "diagnose-fix-learn";

/// Name of the feature-development workflow.
pub const NEW_FEATURE: &str = "new-feature";

/// Built-in workflow definitions.
pub fn builtin_workflows() -> Vec<WorkflowSpec> {
    let passed = ValidationRule::FieldEquals {
        field: "passed".to_string(),
        value: serde_json::Value::Bool(true),
    };

    vec![
        WorkflowSpec {
            name: DIAGNOSE_FIX_LEARN.to_string(),
            description: "Diagnose a detected failure, fix it, verify the fix and capture learnings"
                .to_string(),
            phases: vec![
                PhaseSpec::new(
                    "diagnose",
                    "debugger",
                    PhaseKind::Diagnose,
                    ValidationRule::RequiredFields {
                        fields: vec!["root_cause".to_string()],
                    },
                )
                .retries(1),
                PhaseSpec::new("fix", "dev", PhaseKind::Fix, ValidationRule::HasChanges).retries(2),
                PhaseSpec::new("validate", "qa", PhaseKind::Validate, passed.clone()).retries(1),
                PhaseSpec::new("learn", "learner", PhaseKind::Learn, ValidationRule::Always),
            ],
        },
        WorkflowSpec {
            name: NEW_FEATURE.to_string(),
            description: "Design, specify, test, implement, review and document a feature"
                .to_string(),
            phases: vec![
                PhaseSpec::new(
                    "architect",
                    "architect",
                    PhaseKind::Other,
                    ValidationRule::RequiredFields {
                        fields: vec!["design".to_string()],
                    },
                )
                .approval(),
                PhaseSpec::new(
                    "spec",
                    "spec",
                    PhaseKind::Other,
                    ValidationRule::RequiredFields {
                        fields: vec!["spec".to_string()],
                    },
                ),
                PhaseSpec::new("test-gen", "test-gen", PhaseKind::Other, ValidationRule::HasChanges),
                PhaseSpec::new("dev", "dev", PhaseKind::Fix, ValidationRule::HasChanges).retries(2),
                PhaseSpec::new("qa", "qa", PhaseKind::Validate, passed).retries(1),
                PhaseSpec::new(
                    "review",
                    "review",
                    PhaseKind::Review,
                    ValidationRule::FieldEquals {
                        field: "approved".to_string(),
                        value: serde_json::Value::Bool(true),
                    },
                )
                .approval(),
                PhaseSpec::new("docs", "docs", PhaseKind::Learn, ValidationRule::Always),
            ],
        },
    ]
}
