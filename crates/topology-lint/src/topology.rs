//! Hub/spoke topology declaration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The (hub, spoke) cluster pair a workflow is expected to declare together.
///
/// `hub` is the cluster running ArgoCD, `spoke` the registered cluster the
/// applications should land on. Empty strings mean "not declared".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDeclaration {
    #[serde(default)]
    pub hub: String,
    #[serde(default)]
    pub spoke: String,
}

impl TopologyDeclaration {
    /// Build a declaration, trimming surrounding whitespace.
    #[must_use]
    pub fn new(hub: impl Into<String>, spoke: impl Into<String>) -> Self {
        Self {
            hub: hub.into().trim().to_string(),
            spoke: spoke.into().trim().to_string(),
        }
    }

    #[must_use]
    pub fn has_hub(&self) -> bool {
        !self.hub.is_empty()
    }

    #[must_use]
    pub fn has_spoke(&self) -> bool {
        !self.spoke.is_empty()
    }

    /// Both identifiers are present, as cross-cluster workflows require.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.has_hub() && self.has_spoke()
    }
}

impl fmt::Display for TopologyDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |s: &str| if s.is_empty() { "<unset>".to_string() } else { s.to_string() };
        write!(f, "hub={} spoke={}", show(&self.hub), show(&self.spoke))
    }
}
