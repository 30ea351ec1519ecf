use crate::domain::models::{AutomationTier, Diagnosis, WorkPriority};

/// Category lists and thresholds used to rank a diagnosis.
#[derive(Debug, Clone)]
pub struct PriorityPolicy {
    pub critical_categories: Vec<String>,
    pub high_categories: Vec<String>,
    pub medium_categories: Vec<String>,
    /// Categories never handled without a human, whatever the confidence
    pub manual_categories: Vec<String>,
    /// Occurrences at which a recurring pattern is bumped one priority level
    pub recurrence_bump_at: u32,
    pub tier1_confidence: f64,
    pub tier2_known_confidence: f64,
    pub tier2_confidence: f64,
    pub tier3_confidence: f64,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self {
            critical_categories: names(&["security", "outage", "data-loss"]),
            high_categories: names(&["api-error", "webhook", "delivery-failure", "timeout"]),
            medium_categories: names(&["configuration", "validation", "content"]),
            manual_categories: names(&["security"]),
            recurrence_bump_at: 5,
            tier1_confidence: 0.9,
            tier2_known_confidence: 0.7,
            tier2_confidence: 0.85,
            tier3_confidence: 0.5,
        }
    }
}

/// Derives priority and automation tier from a diagnosis.
///
/// Derivation is pure: the same diagnosis always yields the same pair.
#[derive(Debug, Clone, Default)]
pub struct PriorityCalculator {
    policy: PriorityPolicy,
}

impl PriorityCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: PriorityPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PriorityPolicy {
        &self.policy
    }

    /// Priority from the root-cause category, bumped one level for
    /// frequently recurring patterns.
    pub fn priority(&self, diagnosis: &Diagnosis) -> WorkPriority {
        let category = diagnosis.category();
        let in_list = |list: &[String]| list.iter().any(|c| c == category);

        let base = if in_list(&self.policy.critical_categories) {
            WorkPriority::Critical
        } else if in_list(&self.policy.high_categories) {
            WorkPriority::High
        } else if in_list(&self.policy.medium_categories) {
            WorkPriority::Medium
        } else {
            WorkPriority::Low
        };

        if diagnosis.previous_occurrences >= self.policy.recurrence_bump_at {
            base.escalated()
        } else {
            base
        }
    }

    /// Tier from confidence and whether the pattern has been seen before.
    pub fn tier(&self, diagnosis: &Diagnosis) -> AutomationTier {
        let p = &self.policy;
        if p.manual_categories.iter().any(|c| c == diagnosis.category()) {
            return AutomationTier::MANUAL;
        }

        let confidence = diagnosis.confidence();
        let known = diagnosis.is_known_pattern;
        if known && confidence >= p.tier1_confidence {
            AutomationTier::AUTOMATIC
        } else if (known && confidence >= p.tier2_known_confidence) || confidence >= p.tier2_confidence {
            AutomationTier::SUPERVISED
        } else if confidence >= p.tier3_confidence {
            AutomationTier::ASSISTED
        } else {
            AutomationTier::MANUAL
        }
    }

    pub fn calculate(&self, diagnosis: &Diagnosis) -> (WorkPriority, AutomationTier) {
        (self.priority(diagnosis), self.tier(diagnosis))
    }
}
