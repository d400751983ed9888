//! Deploy lifecycle state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStatus {
    /// Deploy has been created but not picked up
    Pending,
    /// Deploy pipeline is executing
    Running,
    /// Every pipeline command exited zero
    Success,
    /// A pipeline command exited non-zero
    Failed,
    /// A command timed out or an unexpected fault occurred
    Error,
}

impl DeployStatus {
    /// Check if the status is terminal (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeployStatus::Success | DeployStatus::Failed | DeployStatus::Error
        )
    }

    /// Whether moving from `self` to `next` is an allowed transition.
    ///
    /// The lifecycle is one-directional: `pending -> running -> terminal`.
    pub fn can_transition_to(&self, next: DeployStatus) -> bool {
        match self {
            DeployStatus::Pending => next == DeployStatus::Running,
            DeployStatus::Running => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStatus::Pending => "pending",
            DeployStatus::Running => "running",
            DeployStatus::Success => "success",
            DeployStatus::Failed => "failed",
            DeployStatus::Error => "error",
        }
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeployStatus::Pending),
            "running" => Ok(DeployStatus::Running),
            "success" => Ok(DeployStatus::Success),
            "failed" => Ok(DeployStatus::Failed),
            "error" => Ok(DeployStatus::Error),
            other => Err(format!("unknown deploy status: {}", other)),
        }
    }
}
