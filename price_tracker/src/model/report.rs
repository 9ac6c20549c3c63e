//! Outcome of one refresh cycle.

use chrono::{DateTime, Utc};
use price_common::{FetchError, Key, Sample};
use std::time::Duration;

/// Result of fetching one key during a cycle.
pub type Outcome = Result<Sample, FetchError>;

/// Per-key outcome of a cycle, in the order the keys were dispatched.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Cycle number, starting at 1 for each coordinator.
    pub cycle: u64,
    /// Wall-clock time the cycle was dispatched.
    pub started_at: DateTime<Utc>,
    /// Time from dispatch until the last fetch terminated.
    pub elapsed: Duration,
    outcomes: Vec<(Key, Outcome)>,
}

impl CycleReport {
    pub(crate) fn new(
        cycle: u64,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        outcomes: Vec<(Key, Outcome)>,
    ) -> Self {
        Self {
            cycle,
            started_at,
            elapsed,
            outcomes,
        }
    }

    /// Outcome for `key`, if it took part in the cycle.
    pub fn get(&self, key: &Key) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, outcome)| outcome)
    }

    /// All outcomes in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Outcome)> {
        self.outcomes.iter().map(|(k, outcome)| (k, outcome))
    }

    /// Number of keys in the cycle.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the cycle had no keys.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of keys that produced a stored sample.
    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_ok()).count()
    }

    /// Keys that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&Key, &FetchError)> {
        self.outcomes
            .iter()
            .filter_map(|(k, o)| o.as_ref().err().map(|e| (k, e)))
    }
}
