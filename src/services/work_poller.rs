//! Work poller: turns failure signals into prioritized, queued work.
//!
//! Signals arrive from registered channel sources or from `ExternalPoller`s
//! polled on a periodic tick. Each failed signal gets a diagnosis (attached,
//! analyzed, or synthesized), a derived priority and tier, and is enqueued
//! unless it falls below the configured minimum priority. Finished work moves
//! from the queue into a bounded history.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Diagnosis, DiscoveredWork, EnqueueOutcome, FailureSignal, PollerConfig, ValidationResult,
    WorkPriority, WorkQueue, WorkStatus,
};
use crate::domain::ports::{DiagnosticAnalyzer, ExternalPoller, WorkHandler};
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::priority_calculator::PriorityCalculator;

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub max_queue_size: usize,
    pub min_priority: WorkPriority,
    pub auto_handle: bool,
    pub tick_interval: Duration,
    pub history_size: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::from(&PollerConfig::default())
    }
}

impl From<&PollerConfig> for PollerSettings {
    fn from(config: &PollerConfig) -> Self {
        Self {
            max_queue_size: config.max_queue_size,
            min_priority: config.min_priority,
            auto_handle: config.auto_handle,
            tick_interval: Duration::from_secs(config.tick_interval_secs.max(1)),
            history_size: config.history_size,
        }
    }
}

/// Identifies a registered signal source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHandle {
    id: u64,
    name: String,
}

impl SourceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// What happened to one incoming signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The signal reported success; nothing to do.
    Ignored,
    /// Dropped before enqueue.
    BelowThreshold(WorkPriority),
    Enqueued {
        work_id: String,
        evicted: Option<String>,
    },
    /// The queue was full of higher-ranked work.
    QueueFull { work_id: String },
}

/// Snapshot of queue contents and poller counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollerStats {
    pub queued: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub escalated: usize,
    /// Queued work per priority
    pub by_priority: BTreeMap<WorkPriority, usize>,
    pub discovered: u64,
    pub dropped: u64,
    pub evicted: u64,
    pub poller_errors: u64,
}

struct PollerState {
    queue: WorkQueue,
    history: VecDeque<DiscoveredWork>,
}

#[derive(Default)]
struct Counters {
    discovered: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
    poller_errors: AtomicU64,
}

/// Resets the tick flag when a tick finishes, even on panic.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn well_formed(diagnosis: &Diagnosis) -> Result<(), String> {
    let confidence = diagnosis.confidence();
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(format!("malformed diagnosis: confidence {confidence} outside [0, 1]"));
    }
    if diagnosis.category().trim().is_empty() {
        return Err("malformed diagnosis: empty root-cause category".to_string());
    }
    Ok(())
}

pub struct WorkPoller {
    state: tokio::sync::Mutex<PollerState>,
    calculator: PriorityCalculator,
    settings: PollerSettings,
    analyzer: RwLock<Option<Arc<dyn DiagnosticAnalyzer>>>,
    handler: RwLock<Option<Weak<dyn WorkHandler>>>,
    pollers: RwLock<Vec<Arc<dyn ExternalPoller>>>,
    sources: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_source_id: AtomicU64,
    counters: Counters,
    tick_in_flight: AtomicBool,
    running: Arc<AtomicBool>,
    event_bus: Arc<EventBus>,
}

impl WorkPoller {
    pub fn new(settings: PollerSettings, event_bus: Arc<EventBus>) -> Self {
        Self {
            state: tokio::sync::Mutex::new(PollerState {
                queue: WorkQueue::new(settings.max_queue_size),
                history: VecDeque::new(),
            }),
            calculator: PriorityCalculator::new(),
            settings,
            analyzer: RwLock::new(None),
            handler: RwLock::new(None),
            pollers: RwLock::new(Vec::new()),
            sources: Mutex::new(HashMap::new()),
            next_source_id: AtomicU64::new(1),
            counters: Counters::default(),
            tick_in_flight: AtomicBool::new(false),
            running: Arc::new(AtomicBool::new(false)),
            event_bus,
        }
    }

    pub fn with_calculator(mut self, calculator: PriorityCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    pub async fn set_analyzer(&self, analyzer: Arc<dyn DiagnosticAnalyzer>) {
        *self.analyzer.write().await = Some(analyzer);
    }

    /// Handler receiving auto-handled work. Held weakly so the handler may
    /// own the poller.
    pub async fn set_work_handler<H: WorkHandler + 'static>(&self, handler: &Arc<H>) {
        let weak = Arc::downgrade(handler);
        let weak: Weak<dyn WorkHandler> = weak;
        *self.handler.write().await = Some(weak);
    }

    pub async fn add_external_poller(&self, poller: Arc<dyn ExternalPoller>) {
        info!(poller = poller.name(), "External poller added");
        self.pollers.write().await.push(poller);
    }

    // ---------------------------------------------------------------
    // Sources
    // ---------------------------------------------------------------

    /// Consume signals from `receiver` until it closes or the source is
    /// unregistered.
    pub fn register_source(
        self: &Arc<Self>,
        name: impl Into<String>,
        mut receiver: mpsc::Receiver<FailureSignal>,
    ) -> SourceHandle {
        let name = name.into();
        let id = self.next_source_id.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(self);
        let source = name.clone();

        let task = tokio::spawn(async move {
            while let Some(signal) = receiver.recv().await {
                let Some(poller) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = poller.handle_signal(&source, signal).await {
                    warn!(source = %source, error = %e, "Failed to handle signal");
                }
            }
            debug!(source = %source, "Signal source closed");
        });

        self.live_sources().insert(id, task);
        info!(source = %name, "Signal source registered");
        SourceHandle { id, name }
    }

    /// Stop consuming a source. Returns false if it was not registered.
    pub fn unregister_source(&self, handle: &SourceHandle) -> bool {
        let task = self
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.id);
        match task {
            Some(task) => {
                task.abort();
                info!(source = %handle.name, "Signal source unregistered");
                true
            }
            None => false,
        }
    }

    /// Sources still consuming; closed channels are not counted.
    pub fn source_count(&self) -> usize {
        self.live_sources().len()
    }

    /// Source table with tasks whose channel closed already dropped.
    fn live_sources(&self) -> MutexGuard<'_, HashMap<u64, JoinHandle<()>>> {
        let mut sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        sources.retain(|_, task| !task.is_finished());
        sources
    }

    // ---------------------------------------------------------------
    // Intake
    // ---------------------------------------------------------------

    #[instrument(skip(self, signal))]
    pub async fn handle_signal(
        &self,
        source: &str,
        signal: FailureSignal,
    ) -> DomainResult<SignalOutcome> {
        if signal.result.success {
            debug!("Ignoring successful validation result");
            return Ok(SignalOutcome::Ignored);
        }

        let diagnosis = match signal.diagnosis {
            Some(diagnosis) => diagnosis,
            None => self.diagnose(source, &signal.result).await,
        };

        let (priority, tier) = self.calculator.calculate(&diagnosis);
        if !priority.meets_threshold(self.settings.min_priority) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(%priority, min = %self.settings.min_priority, "Signal below minimum priority");
            self.event_bus.publish(EventPayload::WorkDropped {
                priority,
                category: diagnosis.category().to_string(),
                reason: format!("below minimum priority {}", self.settings.min_priority),
            });
            return Ok(SignalOutcome::BelowThreshold(priority));
        }

        let work = DiscoveredWork::new(signal.source, priority, tier, Some(diagnosis))
            .discovered_at(signal.timestamp.min(Utc::now()));
        self.enqueue(work).await
    }

    /// Diagnosis for a signal that arrived without one. Analyzer failures
    /// are reported and fall back to the minimal diagnosis.
    async fn diagnose(&self, source: &str, result: &ValidationResult) -> Diagnosis {
        let analyzer = self.analyzer.read().await.clone();
        let Some(analyzer) = analyzer else {
            return Diagnosis::minimal(result);
        };

        let message = match AssertUnwindSafe(analyzer.analyze(result))
            .catch_unwind()
            .await
        {
            Ok(Ok(diagnosis)) => match well_formed(&diagnosis) {
                Ok(()) => return diagnosis,
                Err(message) => message,
            },
            Ok(Err(e)) => e.to_string(),
            Err(_) => "diagnostic analyzer panicked".to_string(),
        };

        self.counters.poller_errors.fetch_add(1, Ordering::Relaxed);
        warn!(source, error = %message, "Analyzer failed; using minimal diagnosis");
        self.event_bus.publish(EventPayload::PollerError {
            source: source.to_string(),
            message: DomainError::AnalyzerFailed(message).to_string(),
        });
        Diagnosis::minimal(result)
    }

    /// Insert work into the bounded queue, evicting the lowest-ranked
    /// pending item when full.
    #[instrument(skip(self, work), fields(work_id = %work.id))]
    pub async fn enqueue(&self, work: DiscoveredWork) -> DomainResult<SignalOutcome> {
        let work_id = work.id.clone();
        let source = work.source;
        let priority = work.priority();
        let tier = work.tier();
        let category = work
            .diagnosis
            .as_ref()
            .map_or_else(String::new, |d| d.category().to_string());

        let outcome = self.state.lock().await.queue.enqueue(work)?;

        let evicted = match outcome {
            EnqueueOutcome::Inserted => None,
            EnqueueOutcome::Evicted(victim) => {
                self.counters.evicted.fetch_add(1, Ordering::Relaxed);
                info!(evicted = %victim.id, priority = %victim.priority(), "Queue full; evicted work");
                self.event_bus.publish(EventPayload::WorkEvicted {
                    work_id: victim.id.clone(),
                    priority: victim.priority(),
                });
                Some(victim.id)
            }
            EnqueueOutcome::Rejected(rejected) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                info!(%priority, "Queue full of higher-ranked work; dropped");
                self.event_bus.publish(EventPayload::WorkDropped {
                    priority: rejected.priority(),
                    category,
                    reason: "queue full".to_string(),
                });
                return Ok(SignalOutcome::QueueFull { work_id });
            }
        };

        self.counters.discovered.fetch_add(1, Ordering::Relaxed);
        info!(%priority, %tier, category = %category, "Work discovered");
        self.event_bus.publish(EventPayload::WorkDiscovered {
            work_id: work_id.clone(),
            source,
            priority,
            tier: tier.value(),
            category,
        });

        if self.settings.auto_handle && tier.is_auto_handleable() {
            self.dispatch(&work_id).await;
        }

        Ok(SignalOutcome::Enqueued { work_id, evicted })
    }

    /// Hand queued work to the registered handler on its own task.
    async fn dispatch(&self, work_id: &str) {
        let handler = self.handler.read().await.as_ref().and_then(Weak::upgrade);
        let Some(handler) = handler else {
            debug!(work_id, "Auto-handle enabled but no live handler");
            return;
        };
        let Some(work) = self.state.lock().await.queue.get(work_id).cloned() else {
            return;
        };

        tokio::spawn(async move {
            let work_id = work.id.clone();
            if let Err(e) = handler.handle(work).await {
                warn!(work_id = %work_id, error = %e, "Auto-handled work failed");
            }
        });
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Highest-ranked pending work, left in the queue.
    pub async fn get_next_work(&self) -> Option<DiscoveredWork> {
        self.state.lock().await.queue.next_pending().cloned()
    }

    #[instrument(skip(self))]
    pub async fn start_work(&self, work_id: &str) -> DomainResult<DiscoveredWork> {
        let work = self
            .transition(work_id, |w| {
                w.start()?;
                Ok(w.clone())
            })
            .await?;
        info!("Work started");
        self.event_bus.publish(EventPayload::WorkStarted {
            work_id: work_id.to_string(),
        });
        Ok(work)
    }

    #[instrument(skip(self, resolution))]
    pub async fn complete_work(
        &self,
        work_id: &str,
        resolution: &str,
    ) -> DomainResult<DiscoveredWork> {
        let work = self
            .finish(work_id, |w| w.complete(resolution))
            .await?;
        info!(resolution, "Work completed");
        self.event_bus.publish(EventPayload::WorkCompleted {
            work_id: work_id.to_string(),
            resolution: resolution.to_string(),
        });
        Ok(work)
    }

    #[instrument(skip(self, reason))]
    pub async fn escalate_work(&self, work_id: &str, reason: &str) -> DomainResult<DiscoveredWork> {
        let work = self.finish(work_id, |w| w.escalate(reason)).await?;
        warn!(reason, "Work escalated");
        self.event_bus.publish(EventPayload::WorkEscalated {
            work_id: work_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(work)
    }

    /// Apply a lifecycle change to queued work. Finished work only ever
    /// yields the transition error; unknown ids yield `WorkNotFound`.
    async fn transition<R>(
        &self,
        work_id: &str,
        f: impl FnOnce(&mut DiscoveredWork) -> DomainResult<R>,
    ) -> DomainResult<R> {
        let mut state = self.state.lock().await;
        if state.queue.contains(work_id) {
            return state.queue.update(work_id, f);
        }
        match state.history.iter().find(|w| w.id == work_id) {
            Some(finished) => f(&mut finished.clone()),
            None => Err(DomainError::WorkNotFound(work_id.to_string())),
        }
    }

    /// Terminal transition: move the work from the queue into history.
    async fn finish(
        &self,
        work_id: &str,
        f: impl FnOnce(&mut DiscoveredWork) -> DomainResult<()>,
    ) -> DomainResult<DiscoveredWork> {
        let mut state = self.state.lock().await;
        if !state.queue.contains(work_id) {
            return match state.history.iter().find(|w| w.id == work_id) {
                Some(finished) => f(&mut finished.clone()).map(|()| finished.clone()),
                None => Err(DomainError::WorkNotFound(work_id.to_string())),
            };
        }

        state.queue.update(work_id, f)?;
        let work = state
            .queue
            .remove(work_id)
            .ok_or_else(|| DomainError::WorkNotFound(work_id.to_string()))?;

        state.history.push_back(work.clone());
        while state.history.len() > self.settings.history_size {
            state.history.pop_front();
        }
        Ok(work)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// Pending work in dispatch order.
    pub async fn pending_work(&self) -> Vec<DiscoveredWork> {
        self.state.lock().await.queue.pending().cloned().collect()
    }

    /// Queued or recently finished work.
    pub async fn get_work(&self, work_id: &str) -> Option<DiscoveredWork> {
        let state = self.state.lock().await;
        state
            .queue
            .get(work_id)
            .or_else(|| state.history.iter().find(|w| w.id == work_id))
            .cloned()
    }

    /// Finished work, oldest first.
    pub async fn history(&self) -> Vec<DiscoveredWork> {
        self.state.lock().await.history.iter().cloned().collect()
    }

    pub async fn queue_len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Drop all queued and finished work.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.queue.clear();
        state.history.clear();
        info!("Work queue cleared");
    }

    pub async fn stats(&self) -> PollerStats {
        let state = self.state.lock().await;
        let mut stats = PollerStats {
            queued: state.queue.len(),
            pending: state.queue.count_matching(|w| w.status == WorkStatus::Pending),
            in_progress: state.queue.count_matching(|w| w.status == WorkStatus::InProgress),
            discovered: self.counters.discovered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            poller_errors: self.counters.poller_errors.load(Ordering::Relaxed),
            ..PollerStats::default()
        };
        for work in state.queue.iter() {
            *stats.by_priority.entry(work.priority()).or_default() += 1;
        }
        for work in &state.history {
            match work.status {
                WorkStatus::Completed => stats.completed += 1,
                WorkStatus::Escalated => stats.escalated += 1,
                WorkStatus::Pending | WorkStatus::InProgress => {}
            }
        }
        stats
    }

    // ---------------------------------------------------------------
    // Tick
    // ---------------------------------------------------------------

    /// Poll every external poller once. Returns `None` when the previous
    /// tick is still running, otherwise the number of signals handled.
    pub async fn tick(&self) -> Option<usize> {
        if self.tick_in_flight.swap(true, Ordering::SeqCst) {
            debug!("Previous tick still running; skipping");
            return None;
        }
        let _guard = TickGuard(&self.tick_in_flight);

        let pollers = self.pollers.read().await.clone();
        let mut handled = 0;
        for poller in pollers {
            match poller.poll().await {
                Ok(signals) => {
                    for signal in signals {
                        match self.handle_signal(poller.name(), signal).await {
                            Ok(_) => handled += 1,
                            Err(e) => {
                                warn!(poller = poller.name(), error = %e, "Failed to handle polled signal");
                            }
                        }
                    }
                }
                Err(e) => {
                    self.counters.poller_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(poller = poller.name(), error = %e, "External poller failed");
                    self.event_bus.publish(EventPayload::PollerError {
                        source: poller.name().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
        Some(handled)
    }

    /// Start the periodic tick loop.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        let weak = Arc::downgrade(self);
        let running = self.running.clone();
        let tick_interval = self.settings.tick_interval;

        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                tokio::time::sleep(tick_interval).await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let Some(poller) = weak.upgrade() else {
                    break;
                };
                if let Some(handled) = poller.tick().await {
                    debug!(handled, "Poller tick finished");
                }
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for WorkPoller {
    fn drop(&mut self) {
        let sources = self.sources.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, task) in sources.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AutomationTier;
    use crate::domain::models::diagnosis::{MINIMAL_CONFIDENCE, UNKNOWN_CATEGORY};
    use async_trait::async_trait;
    use crate::services::event_bus::UnifiedEvent;
    use tokio::sync::broadcast;

    fn setup(settings: PollerSettings) -> (Arc<WorkPoller>, broadcast::Receiver<UnifiedEvent>) {
        let bus = Arc::new(EventBus::default());
        let rx = bus.subscribe();
        (Arc::new(WorkPoller::new(settings, bus)), rx)
    }

    fn failure() -> FailureSignal {
        FailureSignal::validation_failure(
            ValidationResult::failed(vec!["30003 unreachable".into()]).with_resource("SM1", "message"),
        )
    }

    fn diagnosed(category: &str, confidence: f64) -> FailureSignal {
        let result = ValidationResult::failed(vec!["boom".into()]);
        let diagnosis = Diagnosis::new("p-1", "boom", category, confidence, result.clone()).mark_known(1);
        FailureSignal::validation_failure(result).with_diagnosis(diagnosis)
    }

    fn drain(rx: &mut broadcast::Receiver<UnifiedEvent>) -> Vec<EventPayload> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event.payload);
        }
        out
    }

    struct FailingAnalyzer;

    #[async_trait]
    impl DiagnosticAnalyzer for FailingAnalyzer {
        async fn analyze(&self, _result: &ValidationResult) -> DomainResult<Diagnosis> {
            Err(DomainError::AnalyzerFailed("model offline".into()))
        }
    }

    struct PanickingAnalyzer;

    #[async_trait]
    impl DiagnosticAnalyzer for PanickingAnalyzer {
        async fn analyze(&self, _result: &ValidationResult) -> DomainResult<Diagnosis> {
            panic!("analyzer bug")
        }
    }

    #[tokio::test]
    async fn test_minimal_diagnosis_without_analyzer() {
        let (poller, _rx) = setup(PollerSettings::default());
        let outcome = poller.handle_signal("test", failure()).await.unwrap();
        let SignalOutcome::Enqueued { work_id, evicted } = outcome else {
            panic!("expected enqueue, got {outcome:?}");
        };
        assert!(evicted.is_none());

        let work = poller.get_work(&work_id).await.unwrap();
        let diagnosis = work.diagnosis.as_ref().unwrap();
        assert_eq!(diagnosis.category(), UNKNOWN_CATEGORY);
        assert!((diagnosis.confidence() - MINIMAL_CONFIDENCE).abs() < f64::EPSILON);
        assert!(!diagnosis.is_known_pattern);
        assert_eq!(work.priority(), WorkPriority::Low);
        assert_eq!(work.tier(), AutomationTier::MANUAL);
    }

    #[tokio::test]
    async fn test_successful_signal_ignored() {
        let (poller, _rx) = setup(PollerSettings::default());
        let mut signal = failure();
        signal.result.success = true;
        assert_eq!(poller.handle_signal("test", signal).await.unwrap(), SignalOutcome::Ignored);
        assert_eq!(poller.queue_len().await, 0);
    }

    #[tokio::test]
    async fn test_below_min_priority_dropped() {
        let settings = PollerSettings {
            min_priority: WorkPriority::Medium,
            ..PollerSettings::default()
        };
        let (poller, mut rx) = setup(settings);

        let outcome = poller.handle_signal("test", failure()).await.unwrap();
        assert_eq!(outcome, SignalOutcome::BelowThreshold(WorkPriority::Low));

        let at_threshold = poller
            .handle_signal("test", diagnosed("configuration", 0.6))
            .await
            .unwrap();
        assert!(matches!(at_threshold, SignalOutcome::Enqueued { .. }));
        assert_eq!(poller.queue_len().await, 1);

        let events = drain(&mut rx);
        assert!(matches!(events[0], EventPayload::WorkDropped { priority: WorkPriority::Low, .. }));
        assert_eq!(poller.stats().await.dropped, 1);
    }

    #[tokio::test]
    async fn test_analyzer_error_reported_and_falls_back() {
        let (poller, mut rx) = setup(PollerSettings::default());
        poller.set_analyzer(Arc::new(FailingAnalyzer)).await;

        let outcome = poller.handle_signal("webhooks", failure()).await.unwrap();
        assert!(matches!(outcome, SignalOutcome::Enqueued { .. }));

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            EventPayload::PollerError { source, message } if source == "webhooks" && message.contains("model offline")
        )));
        let work = poller.get_next_work().await.unwrap();
        assert_eq!(work.diagnosis.unwrap().category(), UNKNOWN_CATEGORY);
    }

    #[tokio::test]
    async fn test_panicking_analyzer_does_not_crash() {
        let (poller, _rx) = setup(PollerSettings::default());
        poller.set_analyzer(Arc::new(PanickingAnalyzer)).await;
        let outcome = poller.handle_signal("test", failure()).await.unwrap();
        assert!(matches!(outcome, SignalOutcome::Enqueued { .. }));
        assert_eq!(poller.stats().await.poller_errors, 1);
    }

    #[tokio::test]
    async fn test_lifecycle_moves_work_to_history() {
        let (poller, mut rx) = setup(PollerSettings::default());
        let SignalOutcome::Enqueued { work_id, .. } =
            poller.handle_signal("test", diagnosed("api-error", 0.95)).await.unwrap()
        else {
            panic!("expected enqueue");
        };

        poller.start_work(&work_id).await.unwrap();
        assert!(poller.get_next_work().await.is_none());
        poller.complete_work(&work_id, "patched").await.unwrap();

        assert_eq!(poller.queue_len().await, 0);
        let finished = poller.get_work(&work_id).await.unwrap();
        assert_eq!(finished.status, WorkStatus::Completed);

        let err = poller.escalate_work(&work_id, "late").await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));

        let kinds: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    EventPayload::WorkDiscovered { .. }
                        | EventPayload::WorkStarted { .. }
                        | EventPayload::WorkCompleted { .. }
                )
            })
            .collect();
        assert_eq!(kinds.len(), 3);

        let stats = poller.stats().await;
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn test_unknown_work_id() {
        let (poller, _rx) = setup(PollerSettings::default());
        assert!(matches!(
            poller.start_work("work-missing").await,
            Err(DomainError::WorkNotFound(_))
        ));
        assert!(matches!(
            poller.complete_work("work-missing", "x").await,
            Err(DomainError::WorkNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let settings = PollerSettings {
            history_size: 2,
            ..PollerSettings::default()
        };
        let (poller, _rx) = setup(settings);
        for _ in 0..3 {
            let SignalOutcome::Enqueued { work_id, .. } =
                poller.handle_signal("test", failure()).await.unwrap()
            else {
                panic!("expected enqueue");
            };
            poller.escalate_work(&work_id, "manual").await.unwrap();
        }
        assert_eq!(poller.history().await.len(), 2);
        assert_eq!(poller.stats().await.escalated, 2);
    }

    #[tokio::test]
    async fn test_registered_source_feeds_queue() {
        let (poller, mut rx) = setup(PollerSettings::default());
        let (tx, receiver) = mpsc::channel(8);
        let handle = poller.register_source("validator", receiver);
        assert_eq!(poller.source_count(), 1);

        tx.send(failure()).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event.payload, EventPayload::WorkDiscovered { .. }));

        assert!(poller.unregister_source(&handle));
        assert!(!poller.unregister_source(&handle));
        assert_eq!(poller.source_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_empties_queue() {
        let (poller, _rx) = setup(PollerSettings::default());
        poller.handle_signal("test", failure()).await.unwrap();
        poller.clear().await;
        assert_eq!(poller.queue_len().await, 0);
        assert!(poller.get_next_work().await.is_none());
    }

    #[tokio::test]
    async fn test_tick_without_pollers_is_noop() {
        let (poller, _rx) = setup(PollerSettings::default());
        assert_eq!(poller.tick().await, Some(0));
        assert_eq!(poller.queue_len().await, 0);
    }
}
