//! Bounded FIFO of generic activity waiting for airtime.

use std::collections::VecDeque;

use caster_models::ViewCandidate;

#[derive(Debug, Clone, Copy)]
struct Queued {
    candidate: ViewCandidate,
    enqueued_at: f64,
}

/// Activity zones queued for viewing, oldest first.
///
/// Full queues evict their oldest entry; entries expire after `ttl`
/// seconds. A zone near an already queued one refreshes that entry instead
/// of taking another slot.
#[derive(Debug, Clone)]
pub struct ActivityQueue {
    entries: VecDeque<Queued>,
    capacity: usize,
    ttl: f64,
    merge_radius: f64,
}

impl ActivityQueue {
    pub fn new(capacity: usize, ttl: f64, merge_radius: f64) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            ttl,
            merge_radius,
        }
    }

    pub fn push(&mut self, candidate: ViewCandidate, now: f64) {
        let entry = Queued {
            candidate,
            enqueued_at: now,
        };
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|q| q.candidate.position.is_near(&candidate.position, self.merge_radius))
        {
            *existing = entry;
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Drop entries older than the TTL.
    pub fn expire(&mut self, now: f64) {
        let ttl = self.ttl;
        self.entries.retain(|q| now - q.enqueued_at < ttl);
    }

    /// Oldest entry that `suppressed` does not reject. Rejected entries are discarded.
    pub fn pop_eligible(
        &mut self,
        mut suppressed: impl FnMut(&ViewCandidate) -> bool,
    ) -> Option<ViewCandidate> {
        while let Some(q) = self.entries.pop_front() {
            if !suppressed(&q.candidate) {
                return Some(q.candidate);
            }
        }
        None
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
