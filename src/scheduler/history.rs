//! Bounded in-memory record of finished sweeps.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::fleet::SweepReport;

/// Number of sweep reports kept by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// The most recent sweep reports, oldest first.
#[derive(Debug)]
pub struct SweepHistory {
    entries: Mutex<VecDeque<SweepReport>>,
    limit: usize,
}

impl Default for SweepHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl SweepHistory {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(limit)),
            limit,
        }
    }

    /// Append a report, dropping the oldest beyond the limit.
    pub fn push(&self, report: SweepReport) {
        let mut entries = self.entries();
        entries.push_back(report);
        while entries.len() > self.limit {
            entries.pop_front();
        }
    }

    /// Copy of all kept reports, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SweepReport> {
        self.entries().iter().cloned().collect()
    }

    /// The most recent report.
    #[must_use]
    pub fn last(&self) -> Option<SweepReport> {
        self.entries().back().cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<SweepReport>> {
        // Reports are plain data; a poisoned lock still holds a usable list.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
