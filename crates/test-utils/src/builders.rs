#![allow(dead_code)]

use std::collections::BTreeMap;

use rundag::config::{
    ConfigFile, ConfigSection, DefaultSection, RawConfigFile, TargetConfig, UnitConfig,
};
use rundag::errors::Result;
use rundag::types::FailurePolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                default: DefaultSection::default(),
                target: BTreeMap::new(),
                unit: BTreeMap::new(),
            },
        }
    }

    pub fn with_unit(mut self, name: &str, unit: UnitConfig) -> Self {
        self.config.unit.insert(name.to_string(), unit);
        self
    }

    pub fn with_target(mut self, name: &str) -> Self {
        self.config
            .target
            .insert(name.to_string(), TargetConfig::default());
        self
    }

    pub fn with_fork_target(mut self, name: &str) -> Self {
        self.config.target.insert(
            name.to_string(),
            TargetConfig {
                fork: true,
                vars: BTreeMap::new(),
            },
        );
        self
    }

    pub fn with_target_var(mut self, target: &str, key: &str, value: &str) -> Self {
        self.config
            .target
            .entry(target.to_string())
            .or_default()
            .vars
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_default_env(mut self, key: &str, value: &str) -> Self {
        self.config
            .default
            .env
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.config.failure_policy = policy;
        self
    }

    pub fn strict(mut self, val: bool) -> Self {
        self.config.config.strict = val;
        self
    }

    pub fn with_filter(mut self, pattern: &str) -> Self {
        self.config.config.filter = pattern.to_string();
        self
    }

    pub fn include_forks(mut self, val: bool) -> Self {
        self.config.config.include_forks = val;
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `UnitConfig`.
pub struct UnitConfigBuilder {
    unit: UnitConfig,
}

impl UnitConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            unit: UnitConfig {
                cmd: cmd.to_string(),
                kind: None,
                after: vec![],
                provides: vec![],
                env: BTreeMap::new(),
            },
        }
    }

    pub fn kind(mut self, kind: &str) -> Self {
        self.unit.kind = Some(kind.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.unit.after.push(dep.to_string());
        self
    }

    pub fn provides(mut self, tag: &str) -> Self {
        self.unit.provides.push(tag.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.unit.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> UnitConfig {
        self.unit
    }
}
