//! Diagnosis domain model.
//!
//! A `Diagnosis` is the structured root-cause analysis attached to every unit of
//! discovered work. It is produced by an external validator or analyzer, or
//! synthesized minimally from the raw failure payload when neither is available.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category used when nothing is known about the failure.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Confidence assigned to a synthesized minimal diagnosis.
pub const MINIMAL_CONFIDENCE: f64 = 0.3;

/// Result payload of the check that produced a failure signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    /// Any additional fields the check reported.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl ValidationResult {
    /// A failed result with the given error messages.
    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
            ..Self::default()
        }
    }

    pub fn with_resource(mut self, sid: impl Into<String>, resource_type: impl Into<String>) -> Self {
        self.resource_sid = Some(sid.into());
        self.resource_type = Some(resource_type.into());
        self
    }
}

/// Root cause of a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCause {
    pub category: String,
    pub description: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// A piece of evidence supporting the diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub source: String,
    pub data: serde_json::Value,
    pub relevance: f64,
}

/// A proposed fix for the diagnosed failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedFix {
    pub description: String,
    #[serde(default)]
    pub automated: bool,
}

/// Structured root-cause analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub pattern_id: String,
    pub summary: String,
    pub root_cause: RootCause,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub suggested_fixes: Vec<SuggestedFix>,
    pub is_known_pattern: bool,
    #[serde(default)]
    pub previous_occurrences: u32,
    pub validation_result: ValidationResult,
    pub timestamp: DateTime<Utc>,
}

impl Diagnosis {
    /// Create a diagnosis with the given root cause and no evidence.
    pub fn new(
        pattern_id: impl Into<String>,
        summary: impl Into<String>,
        category: impl Into<String>,
        confidence: f64,
        validation_result: ValidationResult,
    ) -> Self {
        let summary = summary.into();
        Self {
            pattern_id: pattern_id.into(),
            root_cause: RootCause {
                category: category.into(),
                description: summary.clone(),
                confidence: confidence.clamp(0.0, 1.0),
            },
            summary,
            evidence: Vec::new(),
            suggested_fixes: Vec::new(),
            is_known_pattern: false,
            previous_occurrences: 0,
            validation_result,
            timestamp: Utc::now(),
        }
    }

    /// Synthesize the minimal diagnosis used when no validator diagnosis and no
    /// analyzer result are available.
    pub fn minimal(result: &ValidationResult) -> Self {
        let summary = if result.errors.is_empty() {
            "Validation failed without reported errors".to_string()
        } else {
            result.errors.join("; ")
        };
        let resource = result.resource_sid.as_deref().unwrap_or("unknown-resource");

        let mut diagnosis = Self::new(
            format!("unclassified:{resource}"),
            summary,
            UNKNOWN_CATEGORY,
            MINIMAL_CONFIDENCE,
            result.clone(),
        );
        diagnosis.evidence.push(Evidence {
            source: "validation-result".to_string(),
            data: serde_json::to_value(result).unwrap_or_default(),
            relevance: 1.0,
        });
        diagnosis
    }

    pub fn mark_known(mut self, previous_occurrences: u32) -> Self {
        self.is_known_pattern = true;
        self.previous_occurrences = previous_occurrences;
        self
    }

    pub fn category(&self) -> &str {
        &self.root_cause.category
    }

    pub fn confidence(&self) -> f64 {
        self.root_cause.confidence
    }
}
