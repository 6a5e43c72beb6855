//! Served-car counters.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
struct Counters {
    total_served: u64,
    per_gate: BTreeMap<String, u64>,
}

/// Thread-safe counters: total cars served and cars served per gate.
///
/// Both counters live behind one lock so every increment moves them together;
/// an observer can never see the total ahead of the per-gate sum.
#[derive(Debug, Default)]
pub struct Metrics {
    counters: Mutex<Counters>,
}

/// Copy of the counters at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Cars that reached a parking spot.
    pub total_served: u64,
    /// Cars served per origin gate, ordered by gate name.
    pub per_gate: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    /// Returns true if the total equals the sum of the per-gate counts.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.per_gate.values().sum::<u64>() == self.total_served
    }

    /// Cars served from `gate` (zero for unknown gates).
    #[must_use]
    pub fn served_from(&self, gate: &str) -> u64 {
        self.per_gate.get(gate).copied().unwrap_or(0)
    }
}

impl Metrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one served car from `gate`.
    pub fn record_served(&self, gate: &str) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.total_served += 1;
        match counters.per_gate.get_mut(gate) {
            Some(count) => *count += 1,
            None => {
                counters.per_gate.insert(gate.to_string(), 1);
            }
        }
    }

    /// Current counter values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        MetricsSnapshot {
            total_served: counters.total_served,
            per_gate: counters.per_gate.clone(),
        }
    }
}
