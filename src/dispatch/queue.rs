//! The pending-request queue.

use super::handle::CompletionSlot;
use super::request::{CorrelationId, Priority};
use crate::core::tensor::TensorDescriptor;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

/// Position of a job in the queue: higher priority first, then submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct QueueKey {
    priority: Reverse<Priority>,
    seq: u64,
}

impl QueueKey {
    pub(crate) fn new(priority: Priority, seq: u64) -> Self {
        Self {
            priority: Reverse(priority),
            seq,
        }
    }
}

/// A submitted request waiting for a worker.
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) correlation_id: CorrelationId,
    pub(crate) inputs: Vec<TensorDescriptor>,
    pub(crate) submitted_at: Instant,
    pub(crate) deadline: Option<Instant>,
    /// Input digest computed during the cache lookup at submission.
    pub(crate) digest: Option<u128>,
    pub(crate) slot: Arc<CompletionSlot>,
}

#[derive(Debug)]
pub(crate) struct PendingQueue {
    jobs: BTreeMap<QueueKey, Job>,
    deadlines: BTreeSet<(Instant, QueueKey)>,
    next_seq: u64,
    pub(crate) accepting: bool,
    pub(crate) shutdown: bool,
}

impl PendingQueue {
    pub(crate) fn new() -> Self {
        Self {
            jobs: BTreeMap::new(),
            deadlines: BTreeSet::new(),
            next_seq: 0,
            accepting: true,
            shutdown: false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }

    pub(crate) fn push(&mut self, priority: Priority, job: Job) -> QueueKey {
        let key = QueueKey::new(priority, self.next_seq);
        self.next_seq += 1;
        if let Some(deadline) = job.deadline {
            self.deadlines.insert((deadline, key));
        }
        self.jobs.insert(key, job);
        key
    }

    /// Removes and returns the next job to dispatch.
    pub(crate) fn pop_next(&mut self) -> Option<Job> {
        let (key, job) = self.jobs.pop_first()?;
        if let Some(deadline) = job.deadline {
            self.deadlines.remove(&(deadline, key));
        }
        Some(job)
    }

    pub(crate) fn remove(&mut self, key: QueueKey) -> Option<Job> {
        let job = self.jobs.remove(&key)?;
        if let Some(deadline) = job.deadline {
            self.deadlines.remove(&(deadline, key));
        }
        Some(job)
    }

    /// Earliest deadline among queued jobs.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.first().map(|(deadline, _)| *deadline)
    }

    /// Removes every job whose deadline is at or before `now`.
    pub(crate) fn take_expired(&mut self, now: Instant) -> Vec<Job> {
        let mut expired = Vec::new();
        while let Some(&(deadline, key)) = self.deadlines.first() {
            if deadline > now {
                break;
            }
            self.deadlines.pop_first();
            if let Some(job) = self.jobs.remove(&key) {
                expired.push(job);
            }
        }
        expired
    }

    pub(crate) fn drain(&mut self) -> Vec<Job> {
        self.deadlines.clear();
        std::mem::take(&mut self.jobs).into_values().collect()
    }
}
