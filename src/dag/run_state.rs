// src/dag/run_state.rs

//! Per-run state machine: outstanding / in-flight / completed.
//!
//! This is synchronous and does no IO, so it can be stepped by hand in tests.
//! The async loop in [`scheduler`](crate::dag::scheduler) owns one
//! `RunState` per run and is the only thing that mutates it.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use tracing::debug;

use crate::dag::declarations::{CapabilityTag, DependencyModel};
use crate::dag::outcome::Unresolved;
use crate::types::FailurePolicy;

/// Identity of a unit within one run: its index in the input slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub usize);

impl UnitId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Static facts about a unit, captured once when the run starts.
#[derive(Debug, Clone)]
pub struct UnitMeta {
    pub name: String,
    pub kind: String,
    /// Capability tags this unit satisfies once completed (always includes
    /// `kind`).
    pub provides: BTreeSet<CapabilityTag>,
    /// Capability tags that must be available before it may start.
    pub requires: BTreeSet<CapabilityTag>,
}

impl UnitMeta {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        provides: impl IntoIterator<Item = CapabilityTag>,
        model: &DependencyModel,
    ) -> Self {
        let kind = kind.into();
        let mut provides: BTreeSet<CapabilityTag> = provides.into_iter().collect();
        provides.insert(kind.clone());
        let requires = model.dependencies_of(&kind).clone();

        Self {
            name: name.into(),
            kind,
            provides,
            requires,
        }
    }
}

/// Where a unit currently sits in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitPhase {
    Outstanding,
    InFlight,
    Completed,
}

/// Mutable state of a single run.
///
/// Invariant: `outstanding`, `in_flight` and `completed` are pairwise
/// disjoint and together hold every unit.
#[derive(Debug, Clone)]
pub struct RunState {
    units: Vec<UnitMeta>,
    outstanding: BTreeSet<UnitId>,
    in_flight: BTreeSet<UnitId>,
    completed: BTreeSet<UnitId>,
    /// Capability tags provided by completed units.
    available: HashSet<CapabilityTag>,
    /// Capability tags of units that failed or were skipped under
    /// `FailurePolicy::Block`.
    withheld: HashSet<CapabilityTag>,
    policy: FailurePolicy,
}

impl RunState {
    pub fn new(units: Vec<UnitMeta>, policy: FailurePolicy) -> Self {
        let outstanding = (0..units.len()).map(UnitId).collect();
        Self {
            units,
            outstanding,
            in_flight: BTreeSet::new(),
            completed: BTreeSet::new(),
            available: HashSet::new(),
            withheld: HashSet::new(),
            policy,
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn meta(&self, id: UnitId) -> &UnitMeta {
        &self.units[id.index()]
    }

    pub fn outstanding(&self) -> &BTreeSet<UnitId> {
        &self.outstanding
    }

    pub fn in_flight(&self) -> &BTreeSet<UnitId> {
        &self.in_flight
    }

    pub fn completed(&self) -> &BTreeSet<UnitId> {
        &self.completed
    }

    pub fn phase_of(&self, id: UnitId) -> Option<UnitPhase> {
        if self.outstanding.contains(&id) {
            Some(UnitPhase::Outstanding)
        } else if self.in_flight.contains(&id) {
            Some(UnitPhase::InFlight)
        } else if self.completed.contains(&id) {
            Some(UnitPhase::Completed)
        } else {
            None
        }
    }

    /// Whether the given capability is provided by some completed unit.
    pub fn is_available(&self, tag: &str) -> bool {
        self.available.contains(tag)
    }

    /// Both outstanding and in-flight are empty.
    pub fn is_finished(&self) -> bool {
        self.outstanding.is_empty() && self.in_flight.is_empty()
    }

    /// Units remain but none is running, so nothing can complete to make
    /// another one ready. Only meaningful right after a scan that started
    /// nothing.
    pub fn is_stalled(&self) -> bool {
        !self.outstanding.is_empty() && self.in_flight.is_empty()
    }

    /// Every declared capability of `id` is provided by a completed unit.
    pub fn is_ready(&self, id: UnitId) -> bool {
        self.meta(id)
            .requires
            .iter()
            .all(|tag| self.available.contains(tag))
    }

    /// Declared capabilities of `id` not yet provided by a completed unit.
    pub fn missing_for(&self, id: UnitId) -> Vec<CapabilityTag> {
        self.meta(id)
            .requires
            .iter()
            .filter(|tag| !self.available.contains(*tag))
            .cloned()
            .collect()
    }

    /// Readiness scan: move every ready outstanding unit to in-flight.
    ///
    /// Readiness is decided against the completed set as it was before the
    /// scan, so units started together never satisfy each other.
    pub fn scan_ready(&mut self) -> Vec<UnitId> {
        // Decide first, then mutate.
        let ready: Vec<UnitId> = self
            .outstanding
            .iter()
            .copied()
            .filter(|id| self.is_ready(*id))
            .collect();

        for id in &ready {
            self.outstanding.remove(id);
            self.in_flight.insert(*id);
            debug!(unit = %self.meta(*id).name, "dependencies satisfied; marking in-flight");
        }

        ready
    }

    /// Move a finished unit from in-flight to completed.
    ///
    /// Under `FailurePolicy::Unblock` the unit's capabilities become available
    /// whether or not it succeeded. Returns `false` if the unit was not
    /// in flight.
    pub fn mark_completed(&mut self, id: UnitId, succeeded: bool) -> bool {
        if !self.in_flight.remove(&id) {
            return false;
        }
        self.completed.insert(id);

        let provides = self.units[id.index()].provides.clone();
        if succeeded || self.policy == FailurePolicy::Unblock {
            self.available.extend(provides);
        } else {
            self.withheld.extend(provides);
        }
        true
    }

    /// Under `FailurePolicy::Block`, move every outstanding unit that waits
    /// only on failed (or transitively skipped) units to completed.
    ///
    /// Returns the skipped units with the capabilities that blocked them.
    /// Always empty under `FailurePolicy::Unblock`, and when the run is not
    /// stalled.
    pub fn skip_blocked(&mut self) -> Vec<(UnitId, Vec<CapabilityTag>)> {
        if self.policy == FailurePolicy::Unblock || !self.is_stalled() {
            return Vec::new();
        }

        let mut skipped = Vec::new();
        loop {
            let next: Vec<UnitId> = self
                .outstanding
                .iter()
                .copied()
                .filter(|id| {
                    self.meta(*id).requires.iter().all(|tag| {
                        self.available.contains(tag) || self.withheld.contains(tag)
                    })
                })
                .collect();

            if next.is_empty() {
                break;
            }

            for id in next {
                let blocked_on: Vec<CapabilityTag> = self
                    .meta(id)
                    .requires
                    .iter()
                    .filter(|tag| !self.available.contains(*tag))
                    .cloned()
                    .collect();

                self.outstanding.remove(&id);
                self.completed.insert(id);
                let provides = self.units[id.index()].provides.clone();
                self.withheld.extend(provides);
                skipped.push((id, blocked_on));
            }
        }

        skipped
    }

    /// Outstanding units with the capabilities they are still waiting on.
    pub fn unresolved(&self) -> Vec<Unresolved> {
        self.outstanding
            .iter()
            .map(|id| {
                let meta = self.meta(*id);
                Unresolved {
                    unit: meta.name.clone(),
                    kind: meta.kind.clone(),
                    missing: self.missing_for(*id),
                }
            })
            .collect()
    }

    /// The three sets are disjoint and cover every unit.
    pub fn check_invariants(&self) -> bool {
        let total = self.outstanding.len() + self.in_flight.len() + self.completed.len();
        let disjoint = self.outstanding.is_disjoint(&self.in_flight)
            && self.outstanding.is_disjoint(&self.completed)
            && self.in_flight.is_disjoint(&self.completed);
        let in_range = self
            .outstanding
            .iter()
            .chain(&self.in_flight)
            .chain(&self.completed)
            .all(|id| id.index() < self.units.len());

        disjoint && in_range && total == self.units.len()
    }
}
