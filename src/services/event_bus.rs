//! EventBus service for observing work, run and metrics lifecycles.
//!
//! Provides a broadcast-based event system with sequence numbering. Every
//! component publishes into the same bus; logging and reporting tools
//! subscribe without the publishers knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::{PhaseKind, WorkPriority, WorkSource};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned by EventBus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Event category for filtering and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Work,
    Poller,
    Run,
    Phase,
    Learning,
    Metrics,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Work => write!(f, "work"),
            Self::Poller => write!(f, "poller"),
            Self::Run => write!(f, "run"),
            Self::Phase => write!(f, "phase"),
            Self::Learning => write!(f, "learning"),
            Self::Metrics => write!(f, "metrics"),
        }
    }
}

/// Unified event envelope containing all event metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedEvent {
    pub id: EventId,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub category: EventCategory,
    pub work_id: Option<String>,
    pub run_id: Option<Uuid>,
    pub payload: EventPayload,
}

/// Event vocabulary shared by the poller, the phase engine and the metrics collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    // Work lifecycle
    WorkDiscovered {
        work_id: String,
        source: WorkSource,
        priority: WorkPriority,
        tier: u8,
        category: String,
    },
    WorkStarted {
        work_id: String,
    },
    WorkCompleted {
        work_id: String,
        resolution: String,
    },
    WorkEscalated {
        work_id: String,
        reason: String,
    },
    WorkDropped {
        priority: WorkPriority,
        category: String,
        reason: String,
    },
    WorkEvicted {
        work_id: String,
        priority: WorkPriority,
    },
    PollerError {
        source: String,
        message: String,
    },

    // Run lifecycle
    RunStarted {
        run_id: Uuid,
        work_id: String,
        workflow: String,
    },
    PhaseStarted {
        run_id: Uuid,
        work_id: String,
        phase: String,
        phase_index: usize,
        kind: PhaseKind,
        attempt: u32,
    },
    PhaseAttemptFailed {
        run_id: Uuid,
        work_id: String,
        phase: String,
        attempt: u32,
        reason: String,
        will_retry: bool,
    },
    PhaseCompleted {
        run_id: Uuid,
        work_id: String,
        phase: String,
        phase_index: usize,
        kind: PhaseKind,
        attempt: u32,
    },
    RunAwaitingApproval {
        run_id: Uuid,
        work_id: String,
        phase: String,
    },
    RunCompleted {
        run_id: Uuid,
        work_id: String,
    },
    RunFailed {
        run_id: Uuid,
        work_id: String,
        reason: String,
    },
    RunEscalated {
        run_id: Uuid,
        work_id: String,
        reason: String,
    },
    RunCancelled {
        run_id: Uuid,
        work_id: String,
    },
    LearningEmitted {
        run_id: Uuid,
        work_id: String,
        phase: String,
        summary: String,
        novel: bool,
    },

    // Metrics lifecycle
    CycleStarted {
        work_id: String,
    },
    FixAttempted {
        work_id: String,
        attempt: u32,
    },
    LearningCaptured {
        work_id: String,
        novel: bool,
    },
    CycleCompleted {
        work_id: String,
        total_cycle_time_ms: i64,
        fix_attempts: u32,
        first_fix_worked: bool,
    },
    CycleCancelled {
        work_id: String,
    },
}

impl EventPayload {
    pub fn severity(&self) -> EventSeverity {
        match self {
            Self::PollerError { .. } | Self::RunFailed { .. } => EventSeverity::Error,
            Self::WorkEscalated { .. }
            | Self::WorkDropped { .. }
            | Self::WorkEvicted { .. }
            | Self::PhaseAttemptFailed { .. }
            | Self::RunEscalated { .. }
            | Self::RunCancelled { .. }
            | Self::CycleCancelled { .. } => EventSeverity::Warning,
            Self::PhaseStarted { .. } | Self::FixAttempted { .. } => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            Self::WorkDiscovered { .. }
            | Self::WorkStarted { .. }
            | Self::WorkCompleted { .. }
            | Self::WorkEscalated { .. }
            | Self::WorkDropped { .. }
            | Self::WorkEvicted { .. } => EventCategory::Work,
            Self::PollerError { .. } => EventCategory::Poller,
            Self::PhaseStarted { .. } | Self::PhaseAttemptFailed { .. } | Self::PhaseCompleted { .. } => {
                EventCategory::Phase
            }
            Self::LearningEmitted { .. } => EventCategory::Learning,
            Self::CycleStarted { .. }
            | Self::FixAttempted { .. }
            | Self::LearningCaptured { .. }
            | Self::CycleCompleted { .. }
            | Self::CycleCancelled { .. } => EventCategory::Metrics,
            _ => EventCategory::Run,
        }
    }

    pub fn work_id(&self) -> Option<&str> {
        match self {
            Self::WorkDiscovered { work_id, .. }
            | Self::WorkStarted { work_id }
            | Self::WorkCompleted { work_id, .. }
            | Self::WorkEscalated { work_id, .. }
            | Self::WorkEvicted { work_id, .. }
            | Self::RunStarted { work_id, .. }
            | Self::PhaseStarted { work_id, .. }
            | Self::PhaseAttemptFailed { work_id, .. }
            | Self::PhaseCompleted { work_id, .. }
            | Self::RunAwaitingApproval { work_id, .. }
            | Self::RunCompleted { work_id, .. }
            | Self::RunFailed { work_id, .. }
            | Self::RunEscalated { work_id, .. }
            | Self::RunCancelled { work_id, .. }
            | Self::LearningEmitted { work_id, .. }
            | Self::CycleStarted { work_id }
            | Self::FixAttempted { work_id, .. }
            | Self::LearningCaptured { work_id, .. }
            | Self::CycleCompleted { work_id, .. }
            | Self::CycleCancelled { work_id } => Some(work_id),
            Self::WorkDropped { .. } | Self::PollerError { .. } => None,
        }
    }

    pub fn run_id(&self) -> Option<Uuid> {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::PhaseStarted { run_id, .. }
            | Self::PhaseAttemptFailed { run_id, .. }
            | Self::PhaseCompleted { run_id, .. }
            | Self::RunAwaitingApproval { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. }
            | Self::RunEscalated { run_id, .. }
            | Self::RunCancelled { run_id, .. }
            | Self::LearningEmitted { run_id, .. } => Some(*run_id),
            _ => None,
        }
    }
}

impl From<EventPayload> for UnifiedEvent {
    fn from(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            sequence: SequenceNumber(0),
            timestamp: Utc::now(),
            severity: payload.severity(),
            category: payload.category(),
            work_id: payload.work_id().map(str::to_string),
            run_id: payload.run_id(),
            payload,
        }
    }
}

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the broadcast channel.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Central event bus for broadcasting events to multiple consumers.
pub struct EventBus {
    sender: broadcast::Sender<UnifiedEvent>,
    sequence: AtomicU64,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish a payload, wrapping it in an envelope.
    pub fn publish(&self, payload: EventPayload) {
        self.emit(payload.into());
    }

    /// Publish a prepared envelope; the sequence number is always reassigned.
    pub fn emit(&self, mut event: UnifiedEvent) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        event.sequence = SequenceNumber(seq);

        tracing::trace!(
            sequence = seq,
            category = %event.category,
            severity = %event.severity,
            work_id = event.work_id.as_deref().unwrap_or(""),
            "event published"
        );

        // Broadcast to subscribers (ignore send errors - may have no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<UnifiedEvent> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}
