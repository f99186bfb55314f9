//! Inactivity deadlines for active transfers.
//!
//! A min-heap of `(deadline, id, generation)` entries plus a map from id to
//! the currently armed generation. Re-arming or disarming bumps or drops the
//! map entry; superseded heap entries are recognized by their stale
//! generation and discarded when they surface (lazy invalidation, so resets
//! are O(log n) instead of a heap rebuild).

use crate::types::TaskId;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tokio::time::Instant;

pub(crate) struct Watchdog {
    deadlines: BinaryHeap<Reverse<(Instant, TaskId, u64)>>,
    armed: HashMap<TaskId, u64>,
    next_generation: u64,
}

impl Watchdog {
    pub(crate) fn new() -> Self {
        Self {
            deadlines: BinaryHeap::new(),
            armed: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Arm (or re-arm) the timer for `id`; any earlier deadline for the same
    /// task becomes stale
    pub(crate) fn arm(&mut self, id: TaskId, deadline: Instant) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.armed.insert(id, generation);
        self.deadlines.push(Reverse((deadline, id, generation)));
    }

    /// Stop the timer for `id`; a later expiry of its heap entry is ignored
    pub(crate) fn disarm(&mut self, id: TaskId) {
        self.armed.remove(&id);
    }

    pub(crate) fn clear(&mut self) {
        self.deadlines.clear();
        self.armed.clear();
    }

    /// Earliest live deadline, discarding stale entries on the way
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(&Reverse((deadline, id, generation))) = self.deadlines.peek() {
            if self.armed.get(&id) == Some(&generation) {
                return Some(deadline);
            }
            self.deadlines.pop();
        }
        None
    }

    /// Pop every live entry whose deadline has passed and disarm it
    pub(crate) fn take_expired(&mut self, now: Instant) -> Vec<TaskId> {
        let mut fired = Vec::new();
        while let Some(&Reverse((deadline, id, generation))) = self.deadlines.peek() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();
            if self.armed.get(&id) == Some(&generation) {
                self.armed.remove(&id);
                fired.push(id);
            }
        }
        fired
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self, id: TaskId) -> bool {
        self.armed.contains_key(&id)
    }
}
