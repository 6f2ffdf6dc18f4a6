//! Append-only per-item failure log

use ferrorep_types::FailureRecord;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Concurrency-safe collection of per-item failures
#[derive(Debug, Clone, Default)]
pub struct FailureLog {
    records: Arc<Mutex<Vec<FailureRecord>>>,
}

impl FailureLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a failure
    pub fn record(&self, failure: FailureRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure);
    }

    /// Number of recorded failures, duplicates included
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has failed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Failures with one entry per item, first reason wins, insertion order kept
    pub fn deduplicated(&self) -> Vec<FailureRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut seen = HashSet::new();
        records
            .iter()
            .filter(|record| seen.insert(record.item.clone()))
            .cloned()
            .collect()
    }
}
