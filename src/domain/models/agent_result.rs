use serde::{Deserialize, Serialize};

/// A learning reported by an agent during a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Learning {
    pub summary: String,
    /// True when the learning describes a pattern not seen before.
    #[serde(default)]
    pub novel: bool,
}

/// Output of one phase invocation.
///
/// The `output` record is opaque to the engine; only the phase's validator
/// inspects it. A result is produced once per attempt and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub output: serde_json::Value,
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub commits: Vec<String>,
    #[serde(default)]
    pub learnings: Vec<Learning>,
}

impl AgentResult {
    pub fn new(output: serde_json::Value) -> Self {
        Self {
            output,
            ..Self::default()
        }
    }

    pub fn with_files_modified(mut self, files: Vec<String>) -> Self {
        self.files_modified = files;
        self
    }

    pub fn with_files_created(mut self, files: Vec<String>) -> Self {
        self.files_created = files;
        self
    }

    pub fn with_commits(mut self, commits: Vec<String>) -> Self {
        self.commits = commits;
        self
    }

    pub fn with_learning(mut self, summary: impl Into<String>, novel: bool) -> Self {
        self.learnings.push(Learning {
            summary: summary.into(),
            novel,
        });
        self
    }

    /// Whether the phase touched any files.
    pub fn has_changes(&self) -> bool {
        !self.files_created.is_empty() || !self.files_modified.is_empty()
    }

    /// Look up a top-level field of the output record.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.output.get(name)
    }
}
