//! Deploy domain model

use crate::core::state::DeployStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a deploy
pub type DeployId = Uuid;

/// One attempt to ship a revision to a stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deploy {
    /// Unique deploy ID
    pub id: DeployId,

    /// Name of the owning stack
    pub stack: String,

    /// Revision being deployed
    pub until_commit: String,

    /// Current lifecycle status
    pub status: DeployStatus,

    /// Captured command output, in execution order
    pub output: String,

    /// When the deploy was created
    pub created_at: DateTime<Utc>,

    /// When the deploy moved to running
    pub started_at: Option<DateTime<Utc>>,

    /// When the deploy reached a terminal status
    pub finished_at: Option<DateTime<Utc>>,
}

impl Deploy {
    /// Create a new pending deploy
    pub fn new(stack: impl Into<String>, until_commit: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            stack: stack.into(),
            until_commit: until_commit.into(),
            status: DeployStatus::Pending,
            output: String::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == DeployStatus::Pending
    }

    /// Abbreviated revision for display
    pub fn short_commit(&self) -> &str {
        let end = self
            .until_commit
            .char_indices()
            .nth(7)
            .map(|(idx, _)| idx)
            .unwrap_or(self.until_commit.len());
        &self.until_commit[..end]
    }

    /// Short form of the deploy id, used in logs and directory names
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}
