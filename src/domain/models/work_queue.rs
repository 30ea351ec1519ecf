use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::work::{DiscoveredWork, WorkStatus};

/// Queue entry: the work plus its insertion sequence for FIFO tie-breaks.
#[derive(Debug, Clone)]
struct QueuedWork {
    seq: u64,
    work: DiscoveredWork,
}

impl QueuedWork {
    /// Dispatch order: priority (critical first), tier ascending, discovery
    /// time ascending, then insertion order.
    fn dispatch_cmp(&self, other: &Self) -> Ordering {
        other
            .work
            .priority()
            .cmp(&self.work.priority())
            .then_with(|| self.work.tier().cmp(&other.work.tier()))
            .then_with(|| self.work.discovered_at.cmp(&other.work.discovered_at))
            .then_with(|| self.seq.cmp(&other.seq))
    }

    /// Eviction order: lowest priority first, then the least automatable tier,
    /// then the oldest entry.
    fn eviction_cmp(&self, other: &Self) -> Ordering {
        self.work
            .priority()
            .cmp(&other.work.priority())
            .then_with(|| other.work.tier().cmp(&self.work.tier()))
            .then_with(|| self.work.discovered_at.cmp(&other.work.discovered_at))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Result of inserting into a full or non-full queue.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// Inserted without displacing anything.
    Inserted,
    /// Inserted after evicting the returned item.
    Evicted(DiscoveredWork),
    /// The queue was full and the incoming item ranked lowest; it was not inserted.
    Rejected(DiscoveredWork),
}

/// Bounded priority queue of discovered work.
///
/// Holds pending and in-progress work kept in dispatch order. Only pending
/// entries are eligible for eviction.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    entries: VecDeque<QueuedWork>,
    max_size: usize,
    next_seq: u64,
}

impl WorkQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_size.min(1024)),
            max_size: max_size.max(1),
            next_seq: 0,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Insert work, evicting the lowest-ranked pending entry when full.
    ///
    /// The incoming item itself competes for eviction, so a full queue never
    /// drops an item that outranks something it keeps.
    pub fn enqueue(&mut self, work: DiscoveredWork) -> DomainResult<EnqueueOutcome> {
        if self.contains(&work.id) {
            return Err(DomainError::DuplicateWork(work.id));
        }

        let incoming = QueuedWork {
            seq: self.next_seq,
            work,
        };
        self.next_seq += 1;

        if self.entries.len() < self.max_size {
            self.insert_sorted(incoming);
            return Ok(EnqueueOutcome::Inserted);
        }

        let victim = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.work.status == WorkStatus::Pending)
            .min_by(|(_, a), (_, b)| a.eviction_cmp(b))
            .map(|(i, _)| i);

        match victim {
            Some(index) if self.entries[index].eviction_cmp(&incoming) == Ordering::Less => {
                let evicted = self
                    .entries
                    .remove(index)
                    .map(|e| e.work)
                    .ok_or_else(|| DomainError::WorkNotFound(incoming.work.id.clone()))?;
                self.insert_sorted(incoming);
                Ok(EnqueueOutcome::Evicted(evicted))
            }
            _ => Ok(EnqueueOutcome::Rejected(incoming.work)),
        }
    }

    fn insert_sorted(&mut self, entry: QueuedWork) {
        let position = self
            .entries
            .iter()
            .position(|existing| entry.dispatch_cmp(existing) == Ordering::Less)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, entry);
    }

    /// Highest-ranked pending work, without removing it.
    pub fn next_pending(&self) -> Option<&DiscoveredWork> {
        self.entries
            .iter()
            .map(|e| &e.work)
            .find(|w| w.status == WorkStatus::Pending)
    }

    pub fn get(&self, id: &str) -> Option<&DiscoveredWork> {
        self.entries.iter().map(|e| &e.work).find(|w| w.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Apply a mutation to queued work. Status changes never alter order.
    pub fn update<R>(
        &mut self,
        id: &str,
        f: impl FnOnce(&mut DiscoveredWork) -> DomainResult<R>,
    ) -> DomainResult<R> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.work.id == id)
            .ok_or_else(|| DomainError::WorkNotFound(id.to_string()))?;
        f(&mut entry.work)
    }

    pub fn remove(&mut self, id: &str) -> Option<DiscoveredWork> {
        let index = self.entries.iter().position(|e| e.work.id == id)?;
        self.entries.remove(index).map(|e| e.work)
    }

    /// All queued work in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &DiscoveredWork> {
        self.entries.iter().map(|e| &e.work)
    }

    /// Pending work in dispatch order.
    pub fn pending(&self) -> impl Iterator<Item = &DiscoveredWork> {
        self.iter().filter(|w| w.status == WorkStatus::Pending)
    }

    pub fn count_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&DiscoveredWork) -> bool,
    {
        self.iter().filter(|w| predicate(w)).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
