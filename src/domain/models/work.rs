//! Discovered work domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::diagnosis::Diagnosis;

/// Where a unit of work came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkSource {
    ValidationFailure,
    DebuggerAlert,
    UserRequest,
    Scheduled,
    WebhookError,
}

impl fmt::Display for WorkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ValidationFailure => "validation-failure",
            Self::DebuggerAlert => "debugger-alert",
            Self::UserRequest => "user-request",
            Self::Scheduled => "scheduled",
            Self::WebhookError => "webhook-error",
        };
        f.write_str(s)
    }
}

/// Work priority. Variants are declared from least to most urgent so the
/// derived ordering reads naturally: `Critical > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl WorkPriority {
    pub const ALL: [WorkPriority; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// One level more urgent, saturating at critical.
    pub fn escalated(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }

    /// Whether this priority is at or above the configured minimum.
    pub fn meets_threshold(self, min_priority: WorkPriority) -> bool {
        self >= min_priority
    }
}

impl fmt::Display for WorkPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkPriority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(DomainError::InvalidConfiguration(format!(
                "unknown priority: {other}"
            ))),
        }
    }
}

/// Automation tier, 1 (fully automatable) to 4 (human required).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct AutomationTier(u8);

impl AutomationTier {
    pub const AUTOMATIC: Self = Self(1);
    pub const SUPERVISED: Self = Self(2);
    pub const ASSISTED: Self = Self(3);
    pub const MANUAL: Self = Self(4);

    pub fn new(tier: u8) -> DomainResult<Self> {
        if (1..=4).contains(&tier) {
            Ok(Self(tier))
        } else {
            Err(DomainError::InvalidConfiguration(format!(
                "automation tier must be 1-4, got {tier}"
            )))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Tiers 1 and 2 may be started without a human pulling them.
    pub fn is_auto_handleable(self) -> bool {
        self.0 <= 2
    }
}

impl TryFrom<u8> for AutomationTier {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AutomationTier> for u8 {
    fn from(tier: AutomationTier) -> Self {
        tier.0
    }
}

impl fmt::Display for AutomationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier-{}", self.0)
    }
}

/// Lifecycle status of discovered work. Never moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkStatus {
    Pending,
    InProgress,
    Completed,
    Escalated,
}

impl WorkStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Escalated)
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Escalated => "escalated",
        };
        f.write_str(s)
    }
}

/// A queued, prioritized unit of work.
///
/// Priority and tier are fixed at discovery; re-diagnosis creates new work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredWork {
    pub id: String,
    pub source: WorkSource,
    priority: WorkPriority,
    tier: AutomationTier,
    pub status: WorkStatus,
    pub diagnosis: Option<Diagnosis>,
    pub discovered_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
}

impl DiscoveredWork {
    pub fn new(
        source: WorkSource,
        priority: WorkPriority,
        tier: AutomationTier,
        diagnosis: Option<Diagnosis>,
    ) -> Self {
        Self {
            id: format!("work-{}", Uuid::new_v4()),
            source,
            priority,
            tier,
            status: WorkStatus::Pending,
            diagnosis,
            discovered_at: Utc::now(),
            started_at: None,
            completed_at: None,
            resolution: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn discovered_at(mut self, at: DateTime<Utc>) -> Self {
        self.discovered_at = at;
        self
    }

    pub fn priority(&self) -> WorkPriority {
        self.priority
    }

    pub fn tier(&self) -> AutomationTier {
        self.tier
    }

    pub fn is_pending(&self) -> bool {
        self.status == WorkStatus::Pending
    }

    fn invalid(&self, to: WorkStatus, reason: &str) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.status.to_string(),
            to: to.to_string(),
            reason: format!("work {}: {reason}", self.id),
        }
    }

    pub fn start(&mut self) -> DomainResult<()> {
        if self.status != WorkStatus::Pending {
            return Err(self.invalid(WorkStatus::InProgress, "only pending work can start"));
        }
        self.status = WorkStatus::InProgress;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, resolution: impl Into<String>) -> DomainResult<()> {
        if self.status != WorkStatus::InProgress {
            return Err(self.invalid(WorkStatus::Completed, "only in-progress work can complete"));
        }
        self.status = WorkStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.resolution = Some(resolution.into());
        Ok(())
    }

    /// Escalate pending or in-progress work to a human.
    pub fn escalate(&mut self, reason: impl Into<String>) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(self.invalid(WorkStatus::Escalated, "work already finished"));
        }
        self.status = WorkStatus::Escalated;
        self.completed_at = Some(Utc::now());
        self.resolution = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work() -> DiscoveredWork {
        DiscoveredWork::new(
            WorkSource::ValidationFailure,
            WorkPriority::High,
            AutomationTier::SUPERVISED,
            None,
        )
    }

    #[test]
    fn test_priority_ordering_and_threshold() {
        assert!(WorkPriority::Critical > WorkPriority::High);
        assert!(WorkPriority::Medium > WorkPriority::Low);
        assert!(WorkPriority::Medium.meets_threshold(WorkPriority::Medium));
        assert!(WorkPriority::High.meets_threshold(WorkPriority::Medium));
        assert!(!WorkPriority::Low.meets_threshold(WorkPriority::Medium));
        assert_eq!(WorkPriority::Critical.escalated(), WorkPriority::Critical);
        assert_eq!("high".parse::<WorkPriority>().unwrap(), WorkPriority::High);
    }

    #[test]
    fn test_tier_bounds() {
        assert!(AutomationTier::new(0).is_err());
        assert!(AutomationTier::new(5).is_err());
        assert!(AutomationTier::new(2).unwrap().is_auto_handleable());
        assert!(!AutomationTier::ASSISTED.is_auto_handleable());
        let err = serde_json::from_str::<AutomationTier>("7");
        assert!(err.is_err());
        assert_eq!(serde_json::to_string(&AutomationTier::MANUAL).unwrap(), "4");
    }

    #[test]
    fn test_lifecycle_forward_only() {
        let mut w = work();
        assert!(w.complete("done").is_err());
        w.start().unwrap();
        assert!(w.started_at.is_some());
        assert!(w.start().is_err());
        w.complete("patched").unwrap();
        assert_eq!(w.status, WorkStatus::Completed);
        assert_eq!(w.resolution.as_deref(), Some("patched"));
        assert!(w.escalate("too late").is_err());
    }

    #[test]
    fn test_escalate_pending() {
        let mut w = work();
        w.escalate("needs a human").unwrap();
        assert_eq!(w.status, WorkStatus::Escalated);
        assert!(w.start().is_err());
    }
}
