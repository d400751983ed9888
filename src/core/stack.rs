//! Stack domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Capabilities a stack declares through its deploy spec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackCapabilities {
    /// Rollback steps are available
    pub rollback: bool,

    /// The deployed revision can be fetched after a deploy
    pub fetch_deployed_revision: bool,
}

/// A deployment target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stack {
    /// Unique stack name
    pub name: String,

    pub supports_rollback: bool,

    pub supports_fetch_deployed_revision: bool,

    /// Last revision reported by the fetch-deployed-revision follow-up
    pub deployed_revision: Option<String>,

    /// When the record last changed
    pub updated_at: DateTime<Utc>,
}

impl Stack {
    /// Create a stack with every capability off
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supports_rollback: false,
            supports_fetch_deployed_revision: false,
            deployed_revision: None,
            updated_at: Utc::now(),
        }
    }

    pub fn capabilities(&self) -> StackCapabilities {
        StackCapabilities {
            rollback: self.supports_rollback,
            fetch_deployed_revision: self.supports_fetch_deployed_revision,
        }
    }

    /// Overwrite the capability flags with freshly discovered ones
    pub fn apply_capabilities(&mut self, capabilities: StackCapabilities) {
        self.supports_rollback = capabilities.rollback;
        self.supports_fetch_deployed_revision = capabilities.fetch_deployed_revision;
        self.updated_at = Utc::now();
    }
}
