use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::FailurePolicy;

/// Configuration exactly as deserialized from TOML, before validation.
///
/// ```toml
/// [config]
/// failure_policy = "unblock"
/// filter = "^api"
///
/// [target.api]
/// vars = { owner = "acme" }
///
/// [unit.copy]
/// kind = "copy-branch"
/// cmd = "echo copy {target}"
///
/// [unit.default]
/// kind = "default-branch"
/// after = ["copy-branch"]
/// cmd = "echo default {target}"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Global behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Values shared by every unit from `[default]`.
    #[serde(default)]
    pub default: DefaultSection,

    /// Targets from `[target.<name>]`.
    #[serde(default)]
    pub target: BTreeMap<String, TargetConfig>,

    /// Units from `[unit.<name>]`, keyed by unit name.
    #[serde(default)]
    pub unit: BTreeMap<String, UnitConfig>,
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (see `config::validate`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub default: DefaultSection,
    pub target: BTreeMap<String, TargetConfig>,
    pub unit: BTreeMap<String, UnitConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            default: raw.default,
            target: raw.target,
            unit: raw.unit,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Whether a failed unit still unblocks its dependents.
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Reject cycles and unknown capabilities at load time instead of
    /// leaving them to the runtime deadlock detector.
    #[serde(default)]
    pub strict: bool,

    /// Process targets marked `fork = true`.
    #[serde(default)]
    pub include_forks: bool,

    /// Case-insensitive regex a target name must match to be processed.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    ".*".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            strict: false,
            include_forks: false,
            filter: default_filter(),
        }
    }
}

/// `[default]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    /// Environment variables set for every unit command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// `[target.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TargetConfig {
    /// Forks are skipped unless `include_forks` is set.
    #[serde(default)]
    pub fork: bool,

    /// Extra `{placeholder}` values available to unit commands.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

/// `[unit.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitConfig {
    /// Shell command executed for each target.
    pub cmd: String,

    /// Capability tag this unit provides. Defaults to the unit name.
    #[serde(default)]
    pub kind: Option<String>,

    /// Capability tags that must each be provided by a completed unit before
    /// this one may start.
    #[serde(default)]
    pub after: Vec<String>,

    /// Additional capability tags this unit satisfies besides its kind.
    #[serde(default)]
    pub provides: Vec<String>,

    /// Unit-local environment variables, layered over `[default].env`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl UnitConfig {
    /// The unit's kind, falling back to its name.
    pub fn effective_kind<'a>(&'a self, name: &'a str) -> &'a str {
        self.kind.as_deref().unwrap_or(name)
    }

    /// Every capability tag this unit provides: its kind plus `provides`.
    pub fn capabilities(&self, name: &str) -> Vec<String> {
        let mut caps = vec![self.effective_kind(name).to_string()];
        for tag in &self.provides {
            if !caps.contains(tag) {
                caps.push(tag.clone());
            }
        }
        caps
    }
}
