//! Result of running a deploy pipeline

use crate::core::{stage::StageKind, state::DeployStatus};
use serde::Serialize;
use std::time::Duration;

/// How a pipeline run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Every command exited zero
    Success,

    /// A command ran to completion with a non-zero exit
    CommandFailure {
        stage: StageKind,
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// A command exceeded its time budget and was killed
    Timeout {
        stage: StageKind,
        command: String,
        timeout: Duration,
    },

    /// Anything else went wrong
    UnexpectedError { cause: String },
}

impl ExecutionOutcome {
    /// Terminal deploy status for this outcome
    pub fn terminal_status(&self) -> DeployStatus {
        match self {
            ExecutionOutcome::Success => DeployStatus::Success,
            ExecutionOutcome::CommandFailure { .. } => DeployStatus::Failed,
            ExecutionOutcome::Timeout { .. } | ExecutionOutcome::UnexpectedError { .. } => {
                DeployStatus::Error
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success)
    }
}
