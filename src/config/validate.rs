use regex::RegexBuilder;
use tracing::warn;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::DagGraph;
use crate::errors::{Result, RundagError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::RundagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Re-run validation on an already-built config (e.g. after CLI overrides).
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    let raw = RawConfigFile {
        config: cfg.config.clone(),
        default: cfg.default.clone(),
        target: cfg.target.clone(),
        unit: cfg.unit.clone(),
    };
    validate_raw_config(&raw)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_units(cfg)?;
    validate_global_config(cfg)?;
    validate_units(cfg)?;
    validate_graph(cfg)?;
    Ok(())
}

fn ensure_has_units(cfg: &RawConfigFile) -> Result<()> {
    if cfg.unit.is_empty() {
        return Err(RundagError::ConfigError(
            "config must contain at least one [unit.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    RegexBuilder::new(&cfg.config.filter)
        .case_insensitive(true)
        .build()?;
    Ok(())
}

fn validate_units(cfg: &RawConfigFile) -> Result<()> {
    for (name, unit) in cfg.unit.iter() {
        if unit.cmd.trim().is_empty() {
            return Err(RundagError::ConfigError(format!(
                "unit '{}' has an empty `cmd`",
                name
            )));
        }
        if unit.effective_kind(name).trim().is_empty() {
            return Err(RundagError::ConfigError(format!(
                "unit '{}' has an empty `kind`",
                name
            )));
        }
        if let Some(tag) = unit.after.iter().find(|tag| tag.trim().is_empty()) {
            return Err(RundagError::ConfigError(format!(
                "unit '{}' lists an empty capability {:?} in `after`",
                name, tag
            )));
        }
    }
    Ok(())
}

/// Unknown capabilities and cycles make a graph that can never complete.
///
/// In strict mode they are rejected here; otherwise they are only logged and
/// the scheduler reports the affected units as deadlocked at run time.
fn validate_graph(cfg: &RawConfigFile) -> Result<()> {
    let graph = DagGraph::from_units(cfg.unit.iter());

    for (unit, tag) in graph.unknown_capabilities() {
        if cfg.config.strict {
            return Err(RundagError::UnknownCapability(format!(
                "unit '{}' depends on '{}', which no unit provides",
                unit, tag
            )));
        }
        warn!(unit = %unit, capability = %tag, "no unit provides this capability; unit will never run");
    }

    for cycle in graph.cycles() {
        if cfg.config.strict {
            return Err(RundagError::DagCycle(format!(
                "cycle detected between units {}",
                cycle.join(", ")
            )));
        }
        warn!(units = ?cycle, "dependency cycle; these units will never run");
    }

    Ok(())
}
