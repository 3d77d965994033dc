// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, UnitConfig};
use crate::dag::declarations::DependencyModel;

/// Internal node structure: what a unit provides and what it waits for.
#[derive(Debug, Clone)]
struct DagNode {
    kind: String,
    /// Every capability tag the unit satisfies (its kind first).
    provides: Vec<String>,
    /// Capability tags required before the unit may start: the `after`
    /// lists of every unit sharing its kind.
    after: Vec<String>,
}

/// Static view of the configured units, used for validation and dry-run
/// output.
///
/// The scheduler never consults this; it works purely from
/// [`DependencyModel`](crate::dag::DependencyModel) and the completed set.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: BTreeMap<String, DagNode>,
}

/// Idealised execution plan, assuming every unit succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stages {
    /// Groups of units that become ready together.
    pub stages: Vec<Vec<String>>,
    /// Units that never become ready.
    pub stuck: Vec<String>,
}

impl DagGraph {
    pub fn from_units<'a>(units: impl IntoIterator<Item = (&'a String, &'a UnitConfig)>) -> Self {
        let units: Vec<(&String, &UnitConfig)> = units.into_iter().collect();
        let model = DependencyModel::from_units(units.iter().copied());

        let nodes = units
            .into_iter()
            .map(|(name, unit)| {
                let kind = unit.effective_kind(name);
                (
                    name.clone(),
                    DagNode {
                        kind: kind.to_string(),
                        provides: unit.capabilities(name),
                        after: model.dependencies_of(kind).iter().cloned().collect(),
                    },
                )
            })
            .collect();

        Self { nodes }
    }

    /// Build the graph from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::from_units(cfg.unit.iter())
    }

    /// All unit names, in name order.
    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn kind_of(&self, unit: &str) -> Option<&str> {
        self.nodes.get(unit).map(|n| n.kind.as_str())
    }

    /// Capability tags the unit waits for, as the scheduler sees them.
    pub fn dependencies_of(&self, unit: &str) -> &[String] {
        self.nodes
            .get(unit)
            .map(|n| n.after.as_slice())
            .unwrap_or(&[])
    }

    /// Units providing the given capability tag.
    pub fn providers_of(&self, tag: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.provides.iter().any(|p| p == tag))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Units that wait on one of this unit's capabilities.
    pub fn dependents_of(&self, unit: &str) -> Vec<&str> {
        let Some(node) = self.nodes.get(unit) else {
            return Vec::new();
        };

        self.nodes
            .iter()
            .filter(|(_, other)| other.after.iter().any(|tag| node.provides.contains(tag)))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// `(unit, tag)` pairs where no unit provides `tag`.
    pub fn unknown_capabilities(&self) -> Vec<(String, String)> {
        let provided: HashSet<&str> = self
            .nodes
            .values()
            .flat_map(|n| n.provides.iter().map(|p| p.as_str()))
            .collect();

        let mut unknown = Vec::new();
        for (name, node) in &self.nodes {
            for tag in &node.after {
                if !provided.contains(tag.as_str()) {
                    unknown.push((name.clone(), tag.clone()));
                }
            }
        }
        unknown
    }

    /// Simulate readiness scans assuming every unit succeeds.
    pub fn stages(&self) -> Stages {
        let mut available: HashSet<&str> = HashSet::new();
        let mut remaining: BTreeSet<&str> = self.units().collect();
        let mut stages = Vec::new();

        loop {
            let ready: Vec<&str> = remaining
                .iter()
                .copied()
                .filter(|name| {
                    self.dependencies_of(name)
                        .iter()
                        .all(|tag| available.contains(tag.as_str()))
                })
                .collect();

            if ready.is_empty() {
                break;
            }

            for name in &ready {
                remaining.remove(name);
                if let Some(node) = self.nodes.get(*name) {
                    available.extend(node.provides.iter().map(|p| p.as_str()));
                }
            }

            stages.push(ready.into_iter().map(str::to_string).collect());
        }

        Stages {
            stages,
            stuck: remaining.into_iter().map(str::to_string).collect(),
        }
    }

    /// Dependency cycles among units that can never become ready.
    ///
    /// A cycle that another provider breaks (e.g. a second unit of the same
    /// kind with no dependencies) is not reported, since the scheduler's
    /// "any completed provider" rule lets it make progress.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let stuck = self.stages().stuck;
        let stuck_set: HashSet<&str> = stuck.iter().map(|s| s.as_str()).collect();

        // Edge direction: provider -> dependent.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in &stuck {
            graph.add_node(name.as_str());
        }
        for name in &stuck {
            for tag in self.dependencies_of(name) {
                for provider in self.providers_of(tag) {
                    if stuck_set.contains(provider) {
                        graph.add_edge(provider, name.as_str(), ());
                    }
                }
            }
        }

        tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1 || graph.contains_edge(component[0], component[0])
            })
            .map(|component| {
                let mut names: Vec<String> = component.into_iter().map(str::to_string).collect();
                names.sort();
                names
            })
            .collect()
    }
}
