// src/engine/mod.rs

//! Target-level orchestration.
//!
//! The scheduler in [`crate::dag`] knows nothing about targets or modes; it
//! runs a set of units against an opaque context. This module supplies that
//! context ([`UnitContext`]) and runs the configured units once per selected
//! target:
//! - [`targets`] decides which targets are processed.
//! - [`runner`] runs every target in turn and collects the reports.

use std::collections::BTreeMap;

use crate::config::model::TargetConfig;
use crate::dag::{Outcome, RunError};
use crate::types::RunMode;

pub mod runner;
pub mod targets;

pub use runner::Runner;
pub use targets::TargetFilter;

/// Something the units are applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub fork: bool,
    pub vars: BTreeMap<String, String>,
}

impl Target {
    /// A target with no config entry (e.g. named only on the command line).
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fork: false,
            vars: BTreeMap::new(),
        }
    }

    pub fn from_config(name: &str, cfg: &TargetConfig) -> Self {
        Self {
            name: name.to_string(),
            fork: cfg.fork,
            vars: cfg.vars.clone(),
        }
    }
}

/// Context shared by every unit of one run.
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub target: Target,
    pub mode: RunMode,
}

/// Result of running every unit against one target.
#[derive(Debug)]
pub struct TargetReport {
    pub target: String,
    pub result: Result<Outcome, RunError>,
}

impl TargetReport {
    pub fn is_success(&self) -> bool {
        matches!(&self.result, Ok(outcome) if outcome.is_success())
    }
}

/// Reports for every processed target.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<TargetReport>,
    /// Set when a shutdown request stopped processing.
    pub cancelled: bool,
}

impl RunSummary {
    pub fn failed_targets(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.target.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.reports.iter().all(TargetReport::is_success)
    }
}
