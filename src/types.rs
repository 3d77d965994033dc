use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// What a failed unit means for the units that depend on its capabilities.
///
/// - `Unblock` (default): a unit counts as completed once it finishes,
///   whether it succeeded or not, so its dependents still run. This mirrors
///   the behaviour the plugin runner has always had; it is risky because a
///   dependent may act on a prerequisite that never happened.
/// - `Block`: a failed unit's capabilities are withheld. Units left waiting
///   only on failed (or skipped) prerequisites are recorded as skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Unblock,
    Block,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unblock" => Ok(FailurePolicy::Unblock),
            "block" => Ok(FailurePolicy::Block),
            other => Err(format!(
                "invalid failure_policy: {other} (expected \"unblock\" or \"block\")"
            )),
        }
    }
}

/// Whether units may make changes to a target or only report what they
/// would do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    ReadOnly,
    Apply,
}

impl RunMode {
    pub fn from_apply_flag(apply: bool) -> Self {
        if apply { RunMode::Apply } else { RunMode::ReadOnly }
    }

    pub fn is_read_only(self) -> bool {
        matches!(self, RunMode::ReadOnly)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::ReadOnly => "read-only",
            RunMode::Apply => "apply",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
