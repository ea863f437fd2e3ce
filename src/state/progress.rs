use crate::config::CheckpointMode;
use std::collections::BTreeSet;

/// Tracks which IDs of one task are in flight and derives its checkpoint
///
/// The checkpoint is the ID a restarted crawl resumes from, inclusive, so
/// it names work that may be repeated but never work that could be lost
/// (in `Completed` mode). It never moves backwards.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    mode: CheckpointMode,
    start: u64,
    next_id: u64,
    last_dispatched: Option<u64>,
    in_flight: BTreeSet<u64>,
}

impl ProgressTracker {
    /// Creates a tracker for a task resuming at `start`
    pub fn new(mode: CheckpointMode, start: u64) -> Self {
        Self {
            mode,
            start,
            next_id: start,
            last_dispatched: None,
            in_flight: BTreeSet::new(),
        }
    }

    /// Records that work for `id` was handed to a worker
    ///
    /// IDs must be dispatched in increasing order.
    pub fn dispatched(&mut self, id: u64) {
        debug_assert!(id >= self.next_id, "IDs dispatched out of order");
        self.in_flight.insert(id);
        self.last_dispatched = Some(id);
        self.next_id = id + 1;
    }

    /// Records that work for `id` finished, successfully or not
    pub fn completed(&mut self, id: u64) {
        self.in_flight.remove(&id);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Lowest ID whose work has not finished yet
    pub fn lowest_outstanding(&self) -> u64 {
        self.in_flight.first().copied().unwrap_or(self.next_id)
    }

    /// The value to persist as the task's `begin_id`
    pub fn checkpoint(&self) -> u64 {
        match self.mode {
            CheckpointMode::Dispatched => self.last_dispatched.unwrap_or(self.start),
            CheckpointMode::Completed => self
                .lowest_outstanding()
                .saturating_sub(1)
                .max(self.start),
        }
    }
}
