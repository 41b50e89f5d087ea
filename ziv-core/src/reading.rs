//! Readings and the per-cycle poll outcome

use crate::error::PollError;
use crate::register::{RegisterId, Unit};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One timestamped measurement, in Wh or W
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reading {
    pub register: RegisterId,
    pub value: i64,
    pub unit: Unit,
    pub observed_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(register: RegisterId, value: i64, observed_at: DateTime<Utc>) -> Self {
        Self {
            register,
            value,
            unit: register.unit(),
            observed_at,
        }
    }
}

/// Result for one register in one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollEntry {
    pub register: RegisterId,
    pub result: Result<Reading, PollError>,
}

/// Ordered entries for the enabled registers of one cycle
///
/// Entries are kept in polling order and a register appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    entries: Vec<PollEntry>,
}

impl PollOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the entry for the next register
    pub fn push(&mut self, register: RegisterId, result: Result<Reading, PollError>) {
        debug_assert!(
            self.entries.last().is_none_or(|e| e.register < register),
            "entries must follow polling order"
        );
        self.entries.push(PollEntry { register, result });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PollEntry> {
        self.entries.iter()
    }

    /// Registers covered, in order
    pub fn registers(&self) -> Vec<RegisterId> {
        self.entries.iter().map(|e| e.register).collect()
    }

    /// Successful readings, in order
    pub fn readings(&self) -> impl Iterator<Item = &Reading> {
        self.entries.iter().filter_map(|e| e.result.as_ref().ok())
    }

    /// Failed registers with their cause, in order
    pub fn failures(&self) -> impl Iterator<Item = (RegisterId, &PollError)> {
        self.entries
            .iter()
            .filter_map(|e| e.result.as_ref().err().map(|err| (e.register, err)))
    }

    pub fn get(&self, register: RegisterId) -> Option<&PollEntry> {
        self.entries.iter().find(|e| e.register == register)
    }
}

impl<'a> IntoIterator for &'a PollOutcome {
    type Item = &'a PollEntry;
    type IntoIter = std::slice::Iter<'a, PollEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
