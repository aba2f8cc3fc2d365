//! Per-source consecutive-failure tracking.
//!
//! Every failure is kept as an [`ErrorEntry`] for diagnostics. Control flow only looks at
//! the consecutive count, which any success for the same source resets to zero. A crawl
//! run owns one tracker and passes it to the crawler explicitly, so independent runs never
//! share counters.

use crate::types::{ErrorEntry, SourceId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct SourceErrors {
    entries: Vec<ErrorEntry>,
    consecutive: u32,
}

/// Consecutive-failure counters keyed by source
#[derive(Debug)]
pub struct ErrorBudget {
    limit: u32,
    sources: Mutex<HashMap<SourceId, SourceErrors>>,
}

impl ErrorBudget {
    /// Create a tracker that trips once a source fails `limit` times in a row
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Consecutive failures that exhaust a source's budget
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Record a failure for `source`, returning the new consecutive count
    pub fn record_failure(&self, source: &SourceId, cause: impl std::fmt::Display) -> u32 {
        let mut sources = self.lock();
        let errors = sources.entry(source.clone()).or_default();
        errors.entries.push(ErrorEntry {
            source_id: source.clone(),
            cause: cause.to_string(),
            occurred_at: chrono::Utc::now(),
        });
        errors.consecutive += 1;
        errors.consecutive
    }

    /// Record a success for `source`; resets the consecutive count, keeps history
    pub fn record_success(&self, source: &SourceId) {
        let mut sources = self.lock();
        if let Some(errors) = sources.get_mut(source) {
            errors.consecutive = 0;
        }
    }

    /// Current run of failures for `source`
    pub fn consecutive_failures(&self, source: &SourceId) -> u32 {
        self.lock().get(source).map_or(0, |e| e.consecutive)
    }

    /// Whether `source` has used up its budget
    pub fn is_exhausted(&self, source: &SourceId) -> bool {
        self.consecutive_failures(source) >= self.limit
    }

    /// Every failure recorded for `source`, oldest first
    pub fn entries(&self, source: &SourceId) -> Vec<ErrorEntry> {
        self.lock()
            .get(source)
            .map(|e| e.entries.clone())
            .unwrap_or_default()
    }

    /// Number of failures ever recorded for `source`
    pub fn total_failures(&self, source: &SourceId) -> usize {
        self.lock().get(source).map_or(0, |e| e.entries.len())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SourceId, SourceErrors>> {
        // Counters stay meaningful even if a holder panicked mid-update
        self.sources.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
