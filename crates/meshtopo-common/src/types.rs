//! Domain primitive types used across the meshtopo workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of one overlay network instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceName(String);

impl InstanceName {
    /// Creates an instance name from a string value.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a machine taking part in an instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineName(String);

impl MachineName {
    /// Creates a machine name from a string value.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a machine plays in an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Publicly reachable rendezvous point.
    Lighthouse,
    /// Regular participant, possibly behind NAT.
    Node,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lighthouse => write!(f, "lighthouse"),
            Self::Node => write!(f, "node"),
        }
    }
}

/// Lifecycle state of a certificate generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorState {
    /// Waiting for dependencies or for a worker.
    Pending,
    /// The external tool is producing outputs.
    Running,
    /// Outputs are stored and valid.
    Done,
    /// The generator or one of its dependencies failed.
    Failed,
}

impl GeneratorState {
    /// Returns `true` once no further transition can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for GeneratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_order_lexicographically() {
        let mut names = vec![MachineName::new("lh2"), MachineName::new("lh10"), MachineName::new("a")];
        names.sort();
        assert_eq!(names[0].as_str(), "a");
        assert_eq!(names[1].as_str(), "lh10");
    }

    #[test]
    fn generator_state_terminality() {
        assert!(!GeneratorState::Pending.is_terminal());
        assert!(!GeneratorState::Running.is_terminal());
        assert!(GeneratorState::Done.is_terminal());
        assert!(GeneratorState::Failed.is_terminal());
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Lighthouse).expect("serialize");
        assert_eq!(json, "\"lighthouse\"");
    }
}
