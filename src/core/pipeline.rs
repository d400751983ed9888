//! Pipeline domain model

use crate::core::stage::{PipelineStage, StageKind};
use serde::Serialize;
use thiserror::Error;

/// Rejected stage lists
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidPipeline {
    #[error("stage '{0}' appears more than once")]
    DuplicateStage(StageKind),

    #[error("stage '{stage}' must run before '{after}'")]
    OutOfOrder { stage: StageKind, after: StageKind },
}

/// An ordered list of stages for one deploy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Pipeline {
    stages: Vec<PipelineStage>,
}

impl Pipeline {
    /// Build a pipeline, checking that stage kinds appear once and in order
    pub fn new(stages: Vec<PipelineStage>) -> Result<Self, InvalidPipeline> {
        for pair in stages.windows(2) {
            let (earlier, later) = (pair[0].kind(), pair[1].kind());
            if earlier == later {
                return Err(InvalidPipeline::DuplicateStage(later));
            }
            if later < earlier {
                return Err(InvalidPipeline::OutOfOrder {
                    stage: later,
                    after: earlier,
                });
            }
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    pub fn stage(&self, kind: StageKind) -> Option<&PipelineStage> {
        self.stages.iter().find(|s| s.kind() == kind)
    }

    /// True when there are no stages at all
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Total number of commands across all stages
    pub fn command_count(&self) -> usize {
        self.stages.iter().map(|s| s.commands().len()).sum()
    }
}
