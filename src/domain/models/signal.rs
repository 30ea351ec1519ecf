use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::diagnosis::{Diagnosis, ValidationResult};
use crate::domain::models::work::WorkSource;

fn default_source() -> WorkSource {
    WorkSource::ValidationFailure
}

/// External failure signal, as delivered by an event source or poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSignal {
    #[serde(rename = "type")]
    pub signal_type: String,
    #[serde(default = "default_source")]
    pub source: WorkSource,
    pub result: ValidationResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<Diagnosis>,
    pub timestamp: DateTime<Utc>,
}

impl FailureSignal {
    pub fn validation_failure(result: ValidationResult) -> Self {
        Self {
            signal_type: "validation-failure".to_string(),
            source: WorkSource::ValidationFailure,
            result,
            diagnosis: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: WorkSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_diagnosis(mut self, diagnosis: Diagnosis) -> Self {
        self.diagnosis = Some(diagnosis);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_wire_shape() {
        let signal: FailureSignal = serde_json::from_value(json!({
            "type": "validation-failure",
            "result": { "success": false, "resource_sid": "SM123", "errors": ["30003"] },
            "timestamp": "2026-01-05T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(signal.source, WorkSource::ValidationFailure);
        assert!(signal.diagnosis.is_none());
        assert_eq!(signal.result.resource_sid.as_deref(), Some("SM123"));
    }
}
