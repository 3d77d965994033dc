// src/dag/declarations.rs

//! Static dependency declarations, keyed by unit kind.

use std::collections::{BTreeSet, HashMap};

use crate::config::model::{ConfigFile, UnitConfig};

/// A capability tag: the kind identity other units reference when declaring
/// a dependency.
pub type CapabilityTag = String;

static NO_DEPENDENCIES: BTreeSet<CapabilityTag> = BTreeSet::new();

/// Registry mapping a unit kind to the capability tags it requires.
///
/// Declarations are registered once at startup and are never mutated while a
/// run is in progress; the scheduler only ever reads them.
#[derive(Debug, Clone, Default)]
pub struct DependencyModel {
    declarations: HashMap<CapabilityTag, BTreeSet<CapabilityTag>>,
}

impl DependencyModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the dependencies of `kind`.
    ///
    /// Declaring the same kind again adds to its existing set.
    pub fn declare<I, S>(&mut self, kind: impl Into<CapabilityTag>, deps: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CapabilityTag>,
    {
        self.declarations
            .entry(kind.into())
            .or_default()
            .extend(deps.into_iter().map(Into::into));
        self
    }

    /// Builder-style variant of [`declare`](Self::declare).
    pub fn with<I, S>(mut self, kind: impl Into<CapabilityTag>, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CapabilityTag>,
    {
        self.declare(kind, deps);
        self
    }

    /// The declared dependencies of `kind`. Unknown kinds have none.
    pub fn dependencies_of(&self, kind: &str) -> &BTreeSet<CapabilityTag> {
        self.declarations.get(kind).unwrap_or(&NO_DEPENDENCIES)
    }

    /// All kinds with a registered declaration.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.declarations.keys().map(|k| k.as_str())
    }

    /// Build the model from the `[unit.*]` tables.
    ///
    /// Units sharing a kind share one declaration: the union of their
    /// `after` lists.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::from_units(cfg.unit.iter())
    }

    /// Same as [`from_config`](Self::from_config), over `(name, unit)`
    /// pairs.
    pub fn from_units<'a>(units: impl IntoIterator<Item = (&'a String, &'a UnitConfig)>) -> Self {
        let mut model = Self::new();
        for (name, unit) in units {
            model.declare(unit.effective_kind(name), unit.after.iter().cloned());
        }
        model
    }
}
