//! Append-only activity log shared by all cars of a run.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Thread-safe, insertion-ordered sequence of log entries.
///
/// Concurrent appends are ordered by whichever caller takes the lock first, not
/// by simulated time. Entries are never removed or reordered.
#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: Mutex<Vec<String>>,
}

impl ActivityLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        // Entries are pushed whole; a poisoned log is still a valid log.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends one entry.
    pub fn append(&self, entry: impl Into<String>) {
        let entry = entry.into();
        self.lock().push(entry);
    }

    /// All entries appended so far, in append order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
