//! Named workflow definitions available to the engine.
//!
//! Built-in workflows are loaded first; configured specs with the same name
//! replace them. A suspended run stores only its workflow name, so every
//! process that resumes runs must build the same catalog.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{builtin_workflows, Workflow, WorkflowSpec};

#[derive(Clone, Default)]
pub struct WorkflowCatalog {
    workflows: BTreeMap<String, Arc<Workflow>>,
    specs: BTreeMap<String, WorkflowSpec>,
}

impl WorkflowCatalog {
    /// An empty catalog.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog holding the built-in workflows.
    pub fn with_builtins() -> DomainResult<Self> {
        let mut catalog = Self::empty();
        catalog.add_specs(&builtin_workflows())?;
        Ok(catalog)
    }

    /// Built-ins overridden or extended by configured specs.
    pub fn from_specs(specs: &[WorkflowSpec]) -> DomainResult<Self> {
        let mut catalog = Self::with_builtins()?;
        catalog.add_specs(specs)?;
        Ok(catalog)
    }

    pub fn add_specs(&mut self, specs: &[WorkflowSpec]) -> DomainResult<()> {
        for spec in specs {
            let workflow = spec.build()?;
            debug!(workflow = %spec.name, phases = workflow.len(), "Registered workflow spec");
            self.workflows.insert(spec.name.clone(), Arc::new(workflow));
            self.specs.insert(spec.name.clone(), spec.clone());
        }
        Ok(())
    }

    /// Register a workflow built in code; replaces any spec of the same name.
    pub fn register(&mut self, workflow: Workflow) {
        let name = workflow.name().to_string();
        self.specs.remove(&name);
        self.workflows.insert(name, Arc::new(workflow));
    }

    pub fn get(&self, name: &str) -> DomainResult<Arc<Workflow>> {
        self.workflows
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::UnknownWorkflow(name.to_string()))
    }

    /// Declarative definition, when the workflow came from a spec.
    pub fn spec(&self, name: &str) -> Option<&WorkflowSpec> {
        self.specs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(String::as_str)
    }

    pub fn workflows(&self) -> impl Iterator<Item = &Arc<Workflow>> {
        self.workflows.values()
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
