//! Follow-up job scheduling

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Work scheduled after a deploy finishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum FollowUpJob {
    /// Ask the stack which revision it is running now
    FetchDeployedRevision { stack: String },
}

/// Trait for enqueuing follow-up work - fire and forget
#[async_trait::async_trait]
pub trait Scheduler: Send + Sync {
    async fn enqueue(&self, job: FollowUpJob) -> Result<()>;
}

/// Scheduler that forwards jobs into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelScheduler {
    sender: mpsc::UnboundedSender<FollowUpJob>,
}

impl ChannelScheduler {
    /// Create a scheduler together with the receiving end of its queue
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FollowUpJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait::async_trait]
impl Scheduler for ChannelScheduler {
    async fn enqueue(&self, job: FollowUpJob) -> Result<()> {
        debug!("Enqueuing follow-up job {:?}", job);
        self.sender
            .send(job)
            .map_err(|e| anyhow::anyhow!("Follow-up queue is closed, dropped {:?}", e.0))
    }
}
