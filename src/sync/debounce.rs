use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::model::NoteId;

/// Pending remote saves, one deadline per note.
///
/// Scheduling a note that already has a deadline replaces it, so a burst of
/// edits collapses into a single save once the quiet period has elapsed.
#[derive(Debug)]
pub struct DebounceTable {
    quiet: Duration,
    pending: HashMap<NoteId, Instant>,
}

impl DebounceTable {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, id: NoteId, now: Instant) {
        self.pending.insert(id, now + self.quiet);
    }

    /// Drop the pending save for `id`. Returns whether one existed.
    pub fn cancel(&mut self, id: &NoteId) -> bool {
        self.pending.remove(id).is_some()
    }

    pub fn rekey(&mut self, from: &NoteId, to: NoteId) {
        if let Some(deadline) = self.pending.remove(from) {
            self.pending.insert(to, deadline);
        }
    }

    pub fn is_pending(&self, id: &NoteId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Remove and return every note whose quiet period has elapsed, earliest
    /// deadline first.
    pub fn take_due(&mut self, now: Instant) -> Vec<NoteId> {
        let mut due: Vec<(Instant, NoteId)> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, deadline)| (*deadline, id.clone()))
            .collect();
        due.sort();
        for (_, id) in &due {
            self.pending.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }
}
