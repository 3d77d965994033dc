// src/dag/outcome.rs

//! Results produced by a scheduler run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::dag::declarations::CapabilityTag;
use crate::dag::run_state::UnitId;

/// Terminal result of a single unit.
#[derive(Debug, Clone)]
pub enum UnitResult {
    Succeeded,
    Failed(Arc<anyhow::Error>),
    /// Never started because its prerequisites failed
    /// (only under [`FailurePolicy::Block`](crate::types::FailurePolicy)).
    Skipped { blocked_on: Vec<CapabilityTag> },
}

impl UnitResult {
    pub fn is_success(&self) -> bool {
        matches!(self, UnitResult::Succeeded)
    }
}

/// A unit's result together with its identity.
#[derive(Debug, Clone)]
pub struct UnitRecord {
    pub id: UnitId,
    pub name: String,
    pub kind: String,
    pub result: UnitResult,
}

/// One failed unit and its cause.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    pub unit: String,
    pub kind: String,
    pub cause: Arc<anyhow::Error>,
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {:#}", self.unit, self.kind, self.cause)
    }
}

/// Per-unit results of a run.
///
/// The run is successful iff every unit succeeded. Partial failure is a
/// normal outcome, not an error.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    records: BTreeMap<UnitId, UnitRecord>,
}

impl Outcome {
    pub(crate) fn insert(&mut self, record: UnitRecord) {
        self.records.insert(record.id, record);
    }

    pub fn is_success(&self) -> bool {
        self.records.values().all(|r| r.result.is_success())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: UnitId) -> Option<&UnitRecord> {
        self.records.get(&id)
    }

    /// Result of the first unit with the given name.
    pub fn result_of(&self, name: &str) -> Option<&UnitResult> {
        self.records
            .values()
            .find(|r| r.name == name)
            .map(|r| &r.result)
    }

    pub fn records(&self) -> impl Iterator<Item = &UnitRecord> {
        self.records.values()
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.records
            .values()
            .filter(|r| r.result.is_success())
            .map(|r| r.name.as_str())
            .collect()
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.records
            .values()
            .filter(|r| matches!(r.result, UnitResult::Skipped { .. }))
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Every failed unit with its cause.
    pub fn failures(&self) -> Vec<UnitFailure> {
        self.records
            .values()
            .filter_map(|r| match &r.result {
                UnitResult::Failed(cause) => Some(UnitFailure {
                    unit: r.name.clone(),
                    kind: r.kind.clone(),
                    cause: Arc::clone(cause),
                }),
                _ => None,
            })
            .collect()
    }
}

/// An outstanding unit that could never become ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub unit: String,
    pub kind: String,
    /// Declared capability tags that no completed unit provided.
    pub missing: Vec<CapabilityTag>,
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (waiting on {})", self.unit, self.missing.join(", "))
    }
}

/// Fatal errors that abort a run.
#[derive(Error, Debug)]
pub enum RunError {
    /// Nothing is ready and nothing is running while units remain.
    #[error(
        "the dependency graph could not be completed; unresolved units: {}",
        list_unresolved(.unresolved)
    )]
    Deadlock {
        unresolved: Vec<Unresolved>,
        /// Results of the units that did finish before the stall.
        partial: Outcome,
    },

    /// The run was stopped by its shutdown signal.
    #[error("run cancelled; aborted {aborted:?}, never started {never_started:?}")]
    Cancelled {
        aborted: Vec<String>,
        never_started: Vec<String>,
        partial: Outcome,
    },

    /// A unit's task could not be awaited.
    #[error("failed to await unit '{unit}': {message}")]
    Join { unit: String, message: String },
}

impl RunError {
    /// Names of the units a deadlock left outstanding.
    pub fn unresolved_units(&self) -> Vec<&str> {
        match self {
            RunError::Deadlock { unresolved, .. } => {
                unresolved.iter().map(|u| u.unit.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Whatever finished before the run was aborted.
    pub fn partial_outcome(&self) -> Option<&Outcome> {
        match self {
            RunError::Deadlock { partial, .. } | RunError::Cancelled { partial, .. } => {
                Some(partial)
            }
            RunError::Join { .. } => None,
        }
    }
}

fn list_unresolved(unresolved: &[Unresolved]) -> String {
    unresolved
        .iter()
        .map(|u| u.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
