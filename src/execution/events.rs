//! Progress events emitted while a deploy runs

use crate::core::{DeployId, DeployStatus, StageKind};
use std::sync::Arc;
use std::time::Duration;

/// Events that can occur during deploy execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    DeployStarted {
        deploy_id: DeployId,
        stack: String,
        until_commit: String,
        command_count: usize,
    },
    StageStarted {
        deploy_id: DeployId,
        stage: StageKind,
    },
    CommandStarted {
        deploy_id: DeployId,
        stage: StageKind,
        command: String,
    },
    CommandFinished {
        deploy_id: DeployId,
        stage: StageKind,
        command: String,
        /// `None` when the command was killed or never ran
        exit_code: Option<i32>,
        duration: Duration,
    },
    DeployFinished {
        deploy_id: DeployId,
        status: DeployStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;
