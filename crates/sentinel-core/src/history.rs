//! Bounded in-memory log of processing results.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::domain::EventProcessingResult;

/// Default number of results retained.
pub const DEFAULT_RETENTION: usize = 1000;

/// Ring of the most recent results; the oldest entry is evicted when full.
#[derive(Debug)]
pub struct ResultHistory {
    capacity: usize,
    entries: Mutex<VecDeque<EventProcessingResult>>,
}

impl Default for ResultHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RETENTION)
    }
}

impl ResultHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_RETENTION))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append(&self, result: EventProcessingResult) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(result);
    }

    /// Up to `limit` most recent results, newest last.
    pub fn recent(&self, limit: usize) -> Vec<EventProcessingResult> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
