//! Test utilities for shipper

#![allow(dead_code)]

use async_trait::async_trait;
use shipper::command::{CommandError, CommandOutput, CommandRunner};
use shipper::core::{
    Deploy, DeployId, DeployStatus, Pipeline, PipelineStage, Stack, StackCapabilities, StageKind,
};
use shipper::execution::{DeployExecutor, ExecutionEvent, FollowUpJob, Scheduler, WorkspaceFactory};
use shipper::persistence::{DeployStore, InMemoryStore, StoreError};
use shipper::spec::{PipelineProvider, SpecError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Scripted reply for commands containing a pattern
#[derive(Debug, Clone)]
pub enum MockResponse {
    Succeed(String),
    Fail { exit_code: i32, output: String },
    Timeout,
    SpawnError,
}

/// A command the mock runner was asked to run
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub command: String,
    pub working_dir: PathBuf,
    pub dir_existed: bool,
    pub timeout: Duration,
}

/// Mock runner that answers from a script and records every call
#[derive(Clone, Default)]
pub struct MockRunner {
    script: Arc<Vec<(String, MockResponse)>>,
    calls: Arc<Mutex<Vec<RecordedCommand>>>,
    simulate_delay: Option<Duration>,
}

impl MockRunner {
    /// Every command succeeds with empty output
    pub fn new() -> Self {
        Self::default()
    }

    /// The first pattern contained in a command decides its response
    pub fn scripted(script: Vec<(&str, MockResponse)>) -> Self {
        Self {
            script: Arc::new(
                script
                    .into_iter()
                    .map(|(pattern, response)| (pattern.to_string(), response))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.simulate_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }

    fn response_for(&self, command: &str) -> MockResponse {
        self.script
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| MockResponse::Succeed(String::new()))
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(
        &self,
        command: &str,
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push(RecordedCommand {
            command: command.to_string(),
            working_dir: working_dir.to_path_buf(),
            dir_existed: working_dir.is_dir(),
            timeout,
        });

        if let Some(delay) = self.simulate_delay {
            tokio::time::sleep(delay).await;
        }

        match self.response_for(command) {
            MockResponse::Succeed(output) => Ok(CommandOutput::new(output)),
            MockResponse::Fail { exit_code, output } => Err(CommandError::Failed {
                command: command.to_string(),
                exit_code: Some(exit_code),
                output,
            }),
            MockResponse::Timeout => Err(CommandError::Timeout {
                command: command.to_string(),
                timeout,
                output: String::new(),
            }),
            MockResponse::SpawnError => Err(CommandError::Spawn {
                command: command.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "sh: not found"),
            }),
        }
    }
}

/// Provider with a fixed pipeline and capabilities
pub struct MockProvider {
    stages: Vec<(StageKind, Vec<String>)>,
    capabilities: StackCapabilities,
    fetch_steps: Vec<String>,
    fail_discovery: bool,
}

impl MockProvider {
    pub fn new(stages: Vec<(StageKind, Vec<&str>)>, capabilities: StackCapabilities) -> Self {
        Self {
            stages: stages
                .into_iter()
                .map(|(kind, commands)| (kind, commands.into_iter().map(String::from).collect()))
                .collect(),
            capabilities,
            fetch_steps: Vec::new(),
            fail_discovery: false,
        }
    }

    pub fn with_fetch_steps(mut self, steps: Vec<&str>) -> Self {
        self.fetch_steps = steps.into_iter().map(String::from).collect();
        self
    }

    pub fn failing_discovery(mut self) -> Self {
        self.fail_discovery = true;
        self
    }
}

impl PipelineProvider for MockProvider {
    fn discover_stages(&self, _deploy: &Deploy) -> Result<Pipeline, SpecError> {
        if self.fail_discovery {
            return Err(SpecError::UndiscoverableDeploySteps);
        }
        let stages = self
            .stages
            .iter()
            .map(|(kind, commands)| PipelineStage::new(*kind, commands.clone()))
            .collect();
        Ok(Pipeline::new(stages)?)
    }

    fn capabilities(&self, _stack: &str) -> Result<StackCapabilities, SpecError> {
        Ok(self.capabilities)
    }

    fn fetch_deployed_revision_steps(&self, _stack: &str) -> Result<Vec<String>, SpecError> {
        Ok(self.fetch_steps.clone())
    }
}

/// The D1/S1 pipeline: fetch, clone, checkout abc123, no install, deploy.sh
pub fn standard_stages() -> Vec<(StageKind, Vec<&'static str>)> {
    vec![
        (StageKind::Fetch, vec!["git fetch"]),
        (StageKind::Clone, vec!["git clone"]),
        (StageKind::Checkout, vec!["git checkout abc123"]),
        (StageKind::InstallDependencies, vec![]),
        (StageKind::Deploy, vec!["deploy.sh"]),
    ]
}

pub fn all_capabilities() -> StackCapabilities {
    StackCapabilities {
        rollback: true,
        fetch_deployed_revision: true,
    }
}

/// In-memory store with injectable faults
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    fail_capabilities: AtomicBool,
    lose_claims: AtomicBool,
}

impl FlakyStore {
    /// Make capability writes fail
    pub fn fail_capabilities(&self) {
        self.fail_capabilities.store(true, Ordering::SeqCst);
    }

    /// Let another worker win every `pending -> running` claim
    pub fn lose_claims(&self) {
        self.lose_claims.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeployStore for FlakyStore {
    async fn create_stack(&self, name: &str) -> Result<Stack, StoreError> {
        self.inner.create_stack(name).await
    }

    async fn find_stack(&self, name: &str) -> Result<Option<Stack>, StoreError> {
        self.inner.find_stack(name).await
    }

    async fn list_stacks(&self) -> Result<Vec<Stack>, StoreError> {
        self.inner.list_stacks().await
    }

    async fn update_capabilities(
        &self,
        stack: &str,
        capabilities: StackCapabilities,
    ) -> Result<(), StoreError> {
        if self.fail_capabilities.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!("database is locked")));
        }
        self.inner.update_capabilities(stack, capabilities).await
    }

    async fn update_deployed_revision(&self, stack: &str, revision: &str) -> Result<(), StoreError> {
        self.inner.update_deployed_revision(stack, revision).await
    }

    async fn create_deploy(&self, deploy: &Deploy) -> Result<(), StoreError> {
        self.inner.create_deploy(deploy).await
    }

    async fn find_deploy(&self, id: DeployId) -> Result<Option<Deploy>, StoreError> {
        self.inner.find_deploy(id).await
    }

    async fn list_deploys(&self, stack: Option<&str>, limit: usize) -> Result<Vec<Deploy>, StoreError> {
        self.inner.list_deploys(stack, limit).await
    }

    async fn transition_status(
        &self,
        id: DeployId,
        from: DeployStatus,
        to: DeployStatus,
    ) -> Result<bool, StoreError> {
        if from == DeployStatus::Pending && self.lose_claims.load(Ordering::SeqCst) {
            // The other worker claims it between our read and our write
            self.inner.transition_status(id, from, to).await?;
            return Ok(false);
        }
        self.inner.transition_status(id, from, to).await
    }

    async fn append_output(&self, id: DeployId, chunk: &str) -> Result<(), StoreError> {
        self.inner.append_output(id, chunk).await
    }
}

/// Scheduler that keeps every job it is given
#[derive(Default)]
pub struct RecordingScheduler {
    jobs: Mutex<Vec<FollowUpJob>>,
    fail: AtomicBool,
}

impl RecordingScheduler {
    pub fn failing() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            fail: AtomicBool::new(true),
        }
    }

    pub fn jobs(&self) -> Vec<FollowUpJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scheduler for RecordingScheduler {
    async fn enqueue(&self, job: FollowUpJob) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("queue unavailable");
        }
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

/// Everything a scenario needs to run and inspect one executor
pub struct Harness {
    pub executor: DeployExecutor<MockRunner>,
    pub runner: MockRunner,
    pub store: Arc<FlakyStore>,
    pub scheduler: Arc<RecordingScheduler>,
    pub events: Arc<Mutex<Vec<ExecutionEvent>>>,
    pub workspace_root: TempDir,
}

impl Harness {
    pub fn new(runner: MockRunner, provider: MockProvider) -> Self {
        Self::with_scheduler(runner, provider, RecordingScheduler::default())
    }

    pub fn with_scheduler(
        runner: MockRunner,
        provider: MockProvider,
        scheduler: RecordingScheduler,
    ) -> Self {
        let store = Arc::new(FlakyStore::default());
        let scheduler = Arc::new(scheduler);
        let workspace_root = TempDir::new().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));

        let recorded = events.clone();
        let executor = DeployExecutor::new(
            runner.clone(),
            store.clone(),
            Arc::new(provider),
            scheduler.clone(),
        )
        .with_workspaces(WorkspaceFactory::new(workspace_root.path()))
        .with_command_timeout(Duration::from_secs(5))
        .with_event_handler(move |event| recorded.lock().unwrap().push(event));

        Self {
            executor,
            runner,
            store,
            scheduler,
            events,
            workspace_root,
        }
    }

    /// Register stack `stack` and a pending deploy of `revision` on it
    pub async fn create_deploy(&self, stack: &str, revision: &str) -> Deploy {
        self.store.create_stack(stack).await.unwrap();
        let deploy = Deploy::new(stack, revision);
        self.store.create_deploy(&deploy).await.unwrap();
        deploy
    }

    /// Register a deploy that is already in `status`
    pub async fn create_deploy_with_status(&self, stack: &str, status: DeployStatus) -> Deploy {
        self.store.create_stack(stack).await.unwrap();
        let mut deploy = Deploy::new(stack, "abc123");
        deploy.status = status;
        self.store.create_deploy(&deploy).await.unwrap();
        deploy
    }

    pub async fn deploy(&self, id: DeployId) -> Deploy {
        self.store.find_deploy(id).await.unwrap().unwrap()
    }

    pub async fn stack(&self, name: &str) -> Stack {
        self.store.find_stack(name).await.unwrap().unwrap()
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Directories left behind under the workspace root
    pub fn leftover_workspaces(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.workspace_root.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

/// Assert the runner saw exactly these commands, in order
pub fn assert_commands(runner: &MockRunner, expected: &[&str]) {
    let commands = runner.commands();
    assert_eq!(
        commands, expected,
        "commands run:\n{:#?}\n\nexpected:\n{:#?}",
        commands, expected
    );
}

/// Assert the deploy ended with `status`
pub async fn assert_status(harness: &Harness, id: DeployId, status: DeployStatus) {
    let deploy = harness.deploy(id).await;
    assert_eq!(
        deploy.status, status,
        "deploy {} should be {}, output:\n{}",
        deploy.short_id(),
        status,
        deploy.output
    );
}
