//! Persistence layer for deploys and stacks

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteStore;

use crate::core::{Deploy, DeployId, DeployStatus, Stack, StackCapabilities};
use chrono::Utc;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised by deploy stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("deploy {0} not found")]
    DeployNotFound(DeployId),

    #[error("stack '{0}' not found")]
    StackNotFound(String),

    /// The lifecycle forbids this move
    #[error("deploy {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: DeployId,
        from: DeployStatus,
        to: DeployStatus,
    },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Trait for deploy and stack persistence backends
#[async_trait::async_trait]
pub trait DeployStore: Send + Sync {
    /// Register a stack, returning the existing record if there is one
    async fn create_stack(&self, name: &str) -> Result<Stack, StoreError>;

    async fn find_stack(&self, name: &str) -> Result<Option<Stack>, StoreError>;

    /// All stacks, sorted by name
    async fn list_stacks(&self) -> Result<Vec<Stack>, StoreError>;

    /// Overwrite the stack's capability flags
    async fn update_capabilities(
        &self,
        stack: &str,
        capabilities: StackCapabilities,
    ) -> Result<(), StoreError>;

    async fn update_deployed_revision(&self, stack: &str, revision: &str) -> Result<(), StoreError>;

    async fn create_deploy(&self, deploy: &Deploy) -> Result<(), StoreError>;

    async fn find_deploy(&self, id: DeployId) -> Result<Option<Deploy>, StoreError>;

    /// Most recent deploys first, optionally restricted to one stack
    async fn list_deploys(&self, stack: Option<&str>, limit: usize) -> Result<Vec<Deploy>, StoreError>;

    /// Compare-and-set the status.
    ///
    /// Returns `Ok(false)` without changing anything when the deploy is no
    /// longer in `from`. Moves the lifecycle forbids are rejected outright.
    async fn transition_status(
        &self,
        id: DeployId,
        from: DeployStatus,
        to: DeployStatus,
    ) -> Result<bool, StoreError>;

    /// Move a deploy from whatever status it is in now
    async fn update_status(&self, id: DeployId, to: DeployStatus) -> Result<(), StoreError> {
        let deploy = self
            .find_deploy(id)
            .await?
            .ok_or(StoreError::DeployNotFound(id))?;
        if self.transition_status(id, deploy.status, to).await? {
            Ok(())
        } else {
            // Someone else moved it between the read and the write
            let current = self
                .find_deploy(id)
                .await?
                .map(|d| d.status)
                .unwrap_or(deploy.status);
            Err(StoreError::InvalidTransition {
                id,
                from: current,
                to,
            })
        }
    }

    /// Append captured output to the deploy's log
    async fn append_output(&self, id: DeployId, chunk: &str) -> Result<(), StoreError>;
}

fn check_transition(id: DeployId, from: DeployStatus, to: DeployStatus) -> Result<(), StoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition { id, from, to })
    }
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryStore {
    stacks: RwLock<HashMap<String, Stack>>,
    deploys: RwLock<HashMap<DeployId, Deploy>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DeployStore for InMemoryStore {
    async fn create_stack(&self, name: &str) -> Result<Stack, StoreError> {
        let mut stacks = self.stacks.write().await;
        Ok(stacks
            .entry(name.to_string())
            .or_insert_with(|| Stack::new(name))
            .clone())
    }

    async fn find_stack(&self, name: &str) -> Result<Option<Stack>, StoreError> {
        Ok(self.stacks.read().await.get(name).cloned())
    }

    async fn list_stacks(&self) -> Result<Vec<Stack>, StoreError> {
        let mut stacks: Vec<Stack> = self.stacks.read().await.values().cloned().collect();
        stacks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(stacks)
    }

    async fn update_capabilities(
        &self,
        stack: &str,
        capabilities: StackCapabilities,
    ) -> Result<(), StoreError> {
        let mut stacks = self.stacks.write().await;
        let record = stacks
            .get_mut(stack)
            .ok_or_else(|| StoreError::StackNotFound(stack.to_string()))?;
        record.apply_capabilities(capabilities);
        Ok(())
    }

    async fn update_deployed_revision(&self, stack: &str, revision: &str) -> Result<(), StoreError> {
        let mut stacks = self.stacks.write().await;
        let record = stacks
            .get_mut(stack)
            .ok_or_else(|| StoreError::StackNotFound(stack.to_string()))?;
        record.deployed_revision = Some(revision.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn create_deploy(&self, deploy: &Deploy) -> Result<(), StoreError> {
        self.deploys.write().await.insert(deploy.id, deploy.clone());
        Ok(())
    }

    async fn find_deploy(&self, id: DeployId) -> Result<Option<Deploy>, StoreError> {
        Ok(self.deploys.read().await.get(&id).cloned())
    }

    async fn list_deploys(&self, stack: Option<&str>, limit: usize) -> Result<Vec<Deploy>, StoreError> {
        let deploys = self.deploys.read().await;
        let mut result: Vec<Deploy> = deploys
            .values()
            .filter(|d| stack.map_or(true, |name| d.stack == name))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn transition_status(
        &self,
        id: DeployId,
        from: DeployStatus,
        to: DeployStatus,
    ) -> Result<bool, StoreError> {
        check_transition(id, from, to)?;

        // Read and write under one lock so concurrent claims serialize
        let mut deploys = self.deploys.write().await;
        let deploy = deploys.get_mut(&id).ok_or(StoreError::DeployNotFound(id))?;
        if deploy.status != from {
            return Ok(false);
        }

        let now = Utc::now();
        deploy.status = to;
        if to == DeployStatus::Running {
            deploy.started_at = Some(now);
        }
        if to.is_terminal() {
            deploy.finished_at = Some(now);
        }
        Ok(true)
    }

    async fn append_output(&self, id: DeployId, chunk: &str) -> Result<(), StoreError> {
        let mut deploys = self.deploys.write().await;
        let deploy = deploys.get_mut(&id).ok_or(StoreError::DeployNotFound(id))?;
        deploy.output.push_str(chunk);
        Ok(())
    }
}
