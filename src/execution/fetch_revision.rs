//! Fetch-deployed-revision follow-up

use crate::{
    command::CommandRunner,
    core::config::DEFAULT_COMMAND_TIMEOUT_SECS,
    execution::{scheduler::FollowUpJob, workspace::WorkspaceFactory},
    persistence::DeployStore,
    spec::PipelineProvider,
};
use anyhow::{Context, Result};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info};

fn revision_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9a-f]{7,40}$").unwrap())
}

/// Extract the revision from command output: the last non-empty line
pub fn parse_revision(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).rfind(|l| !l.is_empty())?;
    let line = line.to_ascii_lowercase();
    revision_pattern().is_match(&line).then_some(line)
}

/// Runs a stack's fetch steps and records the revision they print
pub struct RevisionFetcher<R> {
    runner: R,
    store: Arc<dyn DeployStore>,
    provider: Arc<dyn PipelineProvider>,
    workspaces: WorkspaceFactory,
    command_timeout: Duration,
}

impl<R: CommandRunner> RevisionFetcher<R> {
    pub fn new(runner: R, store: Arc<dyn DeployStore>, provider: Arc<dyn PipelineProvider>) -> Self {
        Self {
            runner,
            store,
            provider,
            workspaces: WorkspaceFactory::in_temp_dir(),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    pub fn with_workspaces(mut self, workspaces: WorkspaceFactory) -> Self {
        self.workspaces = workspaces;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Run a queued follow-up job
    pub async fn handle(&self, job: FollowUpJob) -> Result<Option<String>> {
        match job {
            FollowUpJob::FetchDeployedRevision { stack } => self.perform(&stack).await,
        }
    }

    /// Fetch and store the revision running on `stack`
    ///
    /// Returns `Ok(None)` when the stack declares no fetch steps.
    pub async fn perform(&self, stack: &str) -> Result<Option<String>> {
        let steps = self.provider.fetch_deployed_revision_steps(stack)?;
        if steps.is_empty() {
            debug!("Stack {} has no fetch steps", stack);
            return Ok(None);
        }

        let workspace = self.workspaces.acquire_named(&format!("{}-fetch-", stack))?;
        let mut last_output = String::new();
        for step in &steps {
            let output = self
                .runner
                .run(step, workspace.path(), self.command_timeout)
                .await
                .with_context(|| format!("Failed to fetch deployed revision of {}", stack))?;
            last_output = output.output;
        }
        workspace.release();

        let revision = parse_revision(&last_output).with_context(|| {
            format!(
                "Fetch steps for {} did not print a revision: {:?}",
                stack,
                last_output.trim()
            )
        })?;

        self.store.update_deployed_revision(stack, &revision).await?;
        info!("Stack {} is running {}", stack, revision);
        Ok(Some(revision))
    }
}
