// src/dag/mod.rs

//! Dependency declarations and dependency-ordered scheduling.
//!
//! - [`declarations`] holds the static kind -> required capabilities model.
//! - [`run_state`] is the per-run outstanding / in-flight / completed state
//!   machine.
//! - [`scheduler`] drives a run: readiness scans, concurrent starts,
//!   deadlock detection.
//! - [`outcome`] defines per-unit results and fatal run errors.
//! - [`graph`] is a static view of the configured units, used for
//!   validation and dry-run output.

pub mod declarations;
pub mod graph;
pub mod outcome;
pub mod run_state;
pub mod scheduler;

pub use declarations::{CapabilityTag, DependencyModel};
pub use graph::{DagGraph, Stages};
pub use outcome::{Outcome, RunError, UnitFailure, UnitRecord, UnitResult, Unresolved};
pub use run_state::{RunState, UnitId, UnitMeta, UnitPhase};
pub use scheduler::Scheduler;
