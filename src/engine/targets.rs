// src/engine/targets.rs

//! Target selection: fork handling, name filter, explicit `--target` list.

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::config::model::ConfigFile;
use crate::engine::Target;
use crate::errors::Result;

#[derive(Debug, Clone)]
pub struct TargetFilter {
    pattern: Regex,
    include_forks: bool,
    only: Vec<String>,
}

impl TargetFilter {
    /// `pattern` is matched case-insensitively against target names.
    pub fn new(pattern: &str, include_forks: bool) -> Result<Self> {
        let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            pattern,
            include_forks,
            only: Vec::new(),
        })
    }

    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Self::new(&cfg.config.filter, cfg.config.include_forks)
    }

    /// Restrict selection to these target names (empty = all configured).
    pub fn only(mut self, names: Vec<String>) -> Self {
        self.only = names;
        self
    }

    pub fn accepts(&self, target: &Target) -> bool {
        if target.fork && !self.include_forks {
            warn!(target_name = %target.name, "skipping target because it is a fork");
            return false;
        }
        if !self.pattern.is_match(&target.name) {
            debug!(
                target_name = %target.name,
                pattern = %self.pattern,
                "skipping target because it does not match the filter"
            );
            return false;
        }
        true
    }

    /// Targets to process, in order.
    ///
    /// Names given via [`only`](Self::only) that have no `[target.<name>]`
    /// table are still processed, with no vars.
    pub fn select(&self, cfg: &ConfigFile) -> Vec<Target> {
        let candidates: Vec<Target> = if self.only.is_empty() {
            cfg.target
                .iter()
                .map(|(name, tc)| Target::from_config(name, tc))
                .collect()
        } else {
            self.only
                .iter()
                .map(|name| match cfg.target.get(name) {
                    Some(tc) => Target::from_config(name, tc),
                    None => Target::named(name.clone()),
                })
                .collect()
        };

        candidates.into_iter().filter(|t| self.accepts(t)).collect()
    }
}
