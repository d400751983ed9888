//! Deploy executor - drives one deploy through its lifecycle

use crate::{
    command::{CommandError, CommandRunner},
    core::{
        config::DEFAULT_COMMAND_TIMEOUT_SECS, Deploy, DeployId, DeployStatus, ExecutionOutcome,
        Pipeline, StackCapabilities, StageKind,
    },
    execution::{
        events::{EventHandler, ExecutionEvent},
        scheduler::{FollowUpJob, Scheduler},
        workspace::WorkspaceFactory,
    },
    persistence::{DeployStore, StoreError},
    spec::PipelineProvider,
};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Result of an `execute` call that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// The deploy was not pending (or another worker claimed it first)
    Skipped { status: DeployStatus },

    /// The pipeline ran and the deploy reached `success` or `failed`
    Finished { outcome: ExecutionOutcome },
}

/// Faults surfaced to the caller of `execute`
///
/// Except for `NotFound`, the deploy has already been moved to `error`
/// and its workspace released when one of these is returned.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("deploy {0} not found")]
    NotFound(DeployId),

    #[error("`{command}` timed out after {} seconds", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a pipeline stopped early
#[derive(Debug)]
enum PipelineError {
    Command { stage: StageKind, error: CommandError },
    Unexpected(anyhow::Error),
}

impl PipelineError {
    fn outcome(&self) -> ExecutionOutcome {
        match self {
            PipelineError::Command {
                stage,
                error:
                    CommandError::Failed {
                        command,
                        exit_code,
                        output,
                    },
            } => ExecutionOutcome::CommandFailure {
                stage: *stage,
                command: command.clone(),
                exit_code: *exit_code,
                output: output.clone(),
            },
            PipelineError::Command {
                stage,
                error: CommandError::Timeout { command, timeout, .. },
            } => ExecutionOutcome::Timeout {
                stage: *stage,
                command: command.clone(),
                timeout: *timeout,
            },
            PipelineError::Command { error, .. } => ExecutionOutcome::UnexpectedError {
                cause: error.to_string(),
            },
            PipelineError::Unexpected(e) => ExecutionOutcome::UnexpectedError {
                cause: format!("{:#}", e),
            },
        }
    }

    /// The error handed back to the caller, or `None` when the failure is absorbed
    fn into_execute_error(self) -> Option<ExecuteError> {
        match self {
            PipelineError::Command {
                error: CommandError::Failed { .. },
                ..
            } => None,
            PipelineError::Command {
                error: CommandError::Timeout { command, timeout, .. },
                ..
            } => Some(ExecuteError::Timeout { command, timeout }),
            PipelineError::Command { error, .. } => {
                Some(ExecuteError::Unexpected(anyhow::Error::new(error)))
            }
            PipelineError::Unexpected(e) => Some(ExecuteError::Unexpected(e)),
        }
    }
}

/// Runs a deploy's pipeline and moves it through `pending -> running -> terminal`
pub struct DeployExecutor<R> {
    runner: R,
    store: Arc<dyn DeployStore>,
    provider: Arc<dyn PipelineProvider>,
    scheduler: Arc<dyn Scheduler>,
    workspaces: WorkspaceFactory,
    command_timeout: Duration,
    event_handlers: Vec<EventHandler>,
}

impl<R: CommandRunner> DeployExecutor<R> {
    pub fn new(
        runner: R,
        store: Arc<dyn DeployStore>,
        provider: Arc<dyn PipelineProvider>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            runner,
            store,
            provider,
            scheduler,
            workspaces: WorkspaceFactory::in_temp_dir(),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            event_handlers: Vec::new(),
        }
    }

    pub fn with_workspaces(mut self, workspaces: WorkspaceFactory) -> Self {
        self.workspaces = workspaces;
        self
    }

    /// Budget applied to each command individually
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Execute one deploy
    ///
    /// Delivering the same id twice is safe: only the caller that wins the
    /// `pending -> running` claim runs anything.
    pub async fn execute(&self, deploy_id: DeployId) -> Result<Execution, ExecuteError> {
        let deploy = self
            .store
            .find_deploy(deploy_id)
            .await?
            .ok_or(ExecuteError::NotFound(deploy_id))?;

        if !deploy.is_pending() {
            info!(
                "Deploy {} is already {}, skipping",
                deploy.short_id(),
                deploy.status
            );
            return Ok(Execution::Skipped {
                status: deploy.status,
            });
        }

        let claimed = self
            .store
            .transition_status(deploy_id, DeployStatus::Pending, DeployStatus::Running)
            .await?;
        if !claimed {
            let status = self
                .store
                .find_deploy(deploy_id)
                .await?
                .map(|d| d.status)
                .unwrap_or(DeployStatus::Running);
            info!(
                "Deploy {} was claimed by another worker ({}), skipping",
                deploy.short_id(),
                status
            );
            return Ok(Execution::Skipped { status });
        }

        info!(
            "Deploying {}@{} (deploy {})",
            deploy.stack,
            deploy.short_commit(),
            deploy.short_id()
        );

        let result = self.run_pipeline(&deploy).await;

        let result = match (result, self.record_capabilities(&deploy.stack).await) {
            (Ok(()), Ok(capabilities)) => Ok(capabilities),
            (Ok(()), Err(e)) => Err(PipelineError::Unexpected(
                e.context("Failed to record stack capabilities"),
            )),
            (Err(failure), Err(e)) => {
                warn!(
                    "Failed to record capabilities for {} after a failed deploy: {:#}",
                    deploy.stack, e
                );
                Err(failure)
            }
            (Err(failure), Ok(_)) => Err(failure),
        };

        let outcome = match &result {
            Ok(_) => ExecutionOutcome::Success,
            Err(failure) => failure.outcome(),
        };
        let status = outcome.terminal_status();

        self.store.update_status(deploy_id, status).await?;
        self.emit_event(ExecutionEvent::DeployFinished { deploy_id, status });

        match result {
            Ok(capabilities) => {
                info!("Deploy {} succeeded", deploy.short_id());
                self.schedule_follow_up(&deploy.stack, capabilities).await;
                Ok(Execution::Finished { outcome })
            }
            Err(failure) => {
                match &outcome {
                    ExecutionOutcome::CommandFailure {
                        stage, exit_code, ..
                    } => warn!(
                        "Deploy {} failed in {} (exit {:?})",
                        deploy.short_id(),
                        stage,
                        exit_code
                    ),
                    other => error!("Deploy {} errored: {:?}", deploy.short_id(), other),
                }
                match failure.into_execute_error() {
                    Some(e) => Err(e),
                    None => Ok(Execution::Finished { outcome }),
                }
            }
        }
    }

    async fn run_pipeline(&self, deploy: &Deploy) -> Result<(), PipelineError> {
        let pipeline = self
            .provider
            .discover_stages(deploy)
            .context("Failed to build deploy pipeline")
            .map_err(PipelineError::Unexpected)?;

        self.emit_event(ExecutionEvent::DeployStarted {
            deploy_id: deploy.id,
            stack: deploy.stack.clone(),
            until_commit: deploy.until_commit.clone(),
            command_count: pipeline.command_count(),
        });

        if pipeline.command_count() == 0 {
            debug!("Deploy {} has nothing to run", deploy.short_id());
            return Ok(());
        }

        let workspace = self
            .workspaces
            .acquire(deploy)
            .map_err(PipelineError::Unexpected)?;

        let result = self.run_stages(deploy, &pipeline, workspace.path()).await;
        workspace.release();
        result
    }

    async fn run_stages(
        &self,
        deploy: &Deploy,
        pipeline: &Pipeline,
        working_dir: &Path,
    ) -> Result<(), PipelineError> {
        for stage in pipeline.stages() {
            if stage.is_empty() {
                debug!("Stage {} has no commands", stage.name());
                continue;
            }

            info!("Stage {}", stage.name());
            self.emit_event(ExecutionEvent::StageStarted {
                deploy_id: deploy.id,
                stage: stage.kind(),
            });

            for command in stage.commands() {
                self.run_command(deploy.id, stage.kind(), command, working_dir)
                    .await?;
            }
        }
        Ok(())
    }

    async fn run_command(
        &self,
        deploy_id: DeployId,
        stage: StageKind,
        command: &str,
        working_dir: &Path,
    ) -> Result<(), PipelineError> {
        self.append_output(deploy_id, &format!("$ {}\n", command))
            .await;
        self.emit_event(ExecutionEvent::CommandStarted {
            deploy_id,
            stage,
            command: command.to_string(),
        });

        let started = Instant::now();
        let result = self
            .runner
            .run(command, working_dir, self.command_timeout)
            .await;

        let (output, exit_code) = match &result {
            Ok(out) => (Some(out.output.as_str()), out.exit_code),
            Err(CommandError::Failed { output, exit_code, .. }) => (Some(output.as_str()), *exit_code),
            Err(e) => (e.output(), None),
        };
        if let Some(output) = output.filter(|o| !o.is_empty()) {
            self.append_output(deploy_id, output).await;
        }

        self.emit_event(ExecutionEvent::CommandFinished {
            deploy_id,
            stage,
            command: command.to_string(),
            exit_code,
            duration: started.elapsed(),
        });

        result
            .map(|_| ())
            .map_err(|error| PipelineError::Command { stage, error })
    }

    /// Append to the deploy log; the log is diagnostic so failures only warn
    async fn append_output(&self, deploy_id: DeployId, chunk: &str) {
        let chunk = if chunk.ends_with('\n') {
            chunk.to_string()
        } else {
            format!("{}\n", chunk)
        };
        if let Err(e) = self.store.append_output(deploy_id, &chunk).await {
            warn!("Failed to append output for deploy {}: {}", deploy_id, e);
        }
    }

    async fn record_capabilities(&self, stack: &str) -> anyhow::Result<StackCapabilities> {
        let capabilities = self.provider.capabilities(stack)?;
        self.store.update_capabilities(stack, capabilities).await?;
        debug!("Recorded capabilities for {}: {:?}", stack, capabilities);
        Ok(capabilities)
    }

    async fn schedule_follow_up(&self, stack: &str, capabilities: StackCapabilities) {
        if !capabilities.fetch_deployed_revision {
            return;
        }
        let job = FollowUpJob::FetchDeployedRevision {
            stack: stack.to_string(),
        };
        if let Err(e) = self.scheduler.enqueue(job).await {
            warn!("Failed to schedule deployed revision fetch for {}: {:#}", stack, e);
        }
    }
}
