// src/types.rs

//! Small policy enums shared by the config layer and the task graph.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// What to do when two tasks may run in either order and at least one of them
/// writes a data slot both declare.
///
/// - `Deny` (default): refuse to build the task graph.
/// - `Warn`: build it, log each conflicting pair.
/// - `Allow`: build it silently; the caller guarantees the tasks commute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    #[default]
    Deny,
    Warn,
    Allow,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deny" => Ok(ConflictPolicy::Deny),
            "warn" => Ok(ConflictPolicy::Warn),
            "allow" => Ok(ConflictPolicy::Allow),
            other => Err(format!(
                "invalid conflict_policy: {other} (expected \"deny\", \"warn\" or \"allow\")"
            )),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConflictPolicy::Deny => "deny",
            ConflictPolicy::Warn => "warn",
            ConflictPolicy::Allow => "allow",
        };
        f.write_str(s)
    }
}
