//! Counters kept by the poller across cycles

use std::collections::BTreeMap;
use ziv_core::{PollError, PollOutcome};

/// Poller statistics
///
/// Register exchanges count GET requests written, not association traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStatistics {
    /// Cycles that reached the reporting step
    pub cycles_completed: u64,
    /// Ticks that arrived while a cycle was running
    pub ticks_dropped: u64,
    /// Cycles abandoned on shutdown
    pub cycles_cancelled: u64,
    pub register_exchanges: u64,
    pub readings: u64,
    /// Failures keyed by [`PollError::kind`]
    pub failures: BTreeMap<&'static str, u64>,
}

impl PollStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn increment_ticks_dropped(&mut self) {
        self.ticks_dropped += 1;
    }

    pub fn increment_cycles_cancelled(&mut self) {
        self.cycles_cancelled += 1;
    }

    pub fn increment_register_exchanges(&mut self) {
        self.register_exchanges += 1;
    }

    pub fn record_failure(&mut self, error: &PollError) {
        *self.failures.entry(error.kind()).or_default() += 1;
    }

    /// Account for a reported cycle
    pub fn record_cycle(&mut self, outcome: &PollOutcome) {
        self.cycles_completed += 1;
        for entry in outcome {
            match &entry.result {
                Ok(_) => self.readings += 1,
                Err(error) => self.record_failure(error),
            }
        }
    }

    pub fn total_failures(&self) -> u64 {
        self.failures.values().sum()
    }
}
