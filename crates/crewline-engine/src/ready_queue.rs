use chrono::{DateTime, Utc};
use crewline_core::Priority;

/// An entry eligible for assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyEntry {
    /// Task identifier.
    pub identifier: String,
    /// Priority band, compared first.
    pub priority: Priority,
    /// Creation time, FIFO within a band.
    pub created_at: DateTime<Utc>,
}

/// Ready-to-assign task list, ordered priority-descending then
/// creation-time-ascending.
///
/// Advisory only: popping an entry is always followed by a claim against
/// the store, which is the real exclusivity check. Stale entries (tasks
/// assigned or cancelled out-of-band) are simply skipped by the claimer.
pub struct ReadyQueue {
    entries: Vec<ReadyEntry>,
}

impl ReadyQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add an entry. Duplicates (same identifier) are ignored.
    pub fn push(&mut self, entry: ReadyEntry) {
        if self.entries.iter().any(|e| e.identifier == entry.identifier) {
            return;
        }
        self.entries.push(entry);
    }

    /// Remove and return the highest-priority, oldest entry.
    pub fn pop(&mut self) -> Option<ReadyEntry> {
        let best = self
            .entries
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            })
            .map(|(i, _)| i)?;
        Some(self.entries.swap_remove(best))
    }

    /// Drop an entry by identifier. Returns true if it was present.
    pub fn remove(&mut self, identifier: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.identifier != identifier);
        self.entries.len() < before
    }

    /// Whether an identifier is queued.
    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.iter().any(|e| e.identifier == identifier)
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
