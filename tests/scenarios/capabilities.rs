//! Test: Capabilities and follow-up scheduling

use crate::helpers::*;
use shipper::core::{DeployStatus, ExecutionOutcome, StackCapabilities};
use shipper::execution::{ExecuteError, Execution};
use shipper::persistence::DeployStore;

fn rollback_only() -> StackCapabilities {
    StackCapabilities {
        rollback: true,
        fetch_deployed_revision: false,
    }
}

/// Without the fetch capability a successful deploy queues nothing
#[tokio::test]
async fn test_no_follow_up_without_fetch_capability() {
    let harness = Harness::new(
        MockRunner::new(),
        MockProvider::new(standard_stages(), rollback_only()),
    );
    let deploy = harness.create_deploy("S1", "abc123").await;

    harness.executor.execute(deploy.id).await.unwrap();

    assert_status(&harness, deploy.id, DeployStatus::Success).await;
    assert!(harness.scheduler.jobs().is_empty());

    let s1 = harness.stack("S1").await;
    assert!(s1.supports_rollback);
    assert!(!s1.supports_fetch_deployed_revision);
}

/// Recorded flags follow the provider, including switching off
#[tokio::test]
async fn test_capabilities_overwritten_each_run() {
    let harness = Harness::new(
        MockRunner::new(),
        MockProvider::new(standard_stages(), StackCapabilities::default()),
    );
    let deploy = harness.create_deploy("S1", "abc123").await;
    harness
        .store
        .update_capabilities("S1", all_capabilities())
        .await
        .unwrap();

    harness.executor.execute(deploy.id).await.unwrap();

    assert_eq!(harness.stack("S1").await.capabilities(), StackCapabilities::default());
}

/// A failed capability write turns a successful pipeline into an error
#[tokio::test]
async fn test_capability_failure_after_success() {
    let harness = Harness::new(
        MockRunner::new(),
        MockProvider::new(standard_stages(), all_capabilities()),
    );
    let deploy = harness.create_deploy("S1", "abc123").await;
    harness.store.fail_capabilities();

    let err = harness.executor.execute(deploy.id).await.unwrap_err();

    assert!(matches!(err, ExecuteError::Unexpected(_)));
    assert!(format!("{:#}", err).contains("database is locked"));
    assert_status(&harness, deploy.id, DeployStatus::Error).await;
    assert!(harness.scheduler.jobs().is_empty());
}

/// A failed capability write does not mask a command failure
#[tokio::test]
async fn test_capability_failure_after_command_failure() {
    let runner = MockRunner::scripted(vec![(
        "deploy.sh",
        MockResponse::Fail {
            exit_code: 1,
            output: String::new(),
        },
    )]);
    let harness = Harness::new(runner, MockProvider::new(standard_stages(), all_capabilities()));
    let deploy = harness.create_deploy("S1", "abc123").await;
    harness.store.fail_capabilities();

    let result = harness.executor.execute(deploy.id).await.unwrap();

    assert!(matches!(
        result,
        Execution::Finished {
            outcome: ExecutionOutcome::CommandFailure { .. }
        }
    ));
    assert_status(&harness, deploy.id, DeployStatus::Failed).await;
}

/// A broken queue does not undo a successful deploy
#[tokio::test]
async fn test_enqueue_failure_keeps_success() {
    let harness = Harness::with_scheduler(
        MockRunner::new(),
        MockProvider::new(standard_stages(), all_capabilities()),
        RecordingScheduler::failing(),
    );
    let deploy = harness.create_deploy("S1", "abc123").await;

    let result = harness.executor.execute(deploy.id).await.unwrap();

    assert_eq!(
        result,
        Execution::Finished {
            outcome: ExecutionOutcome::Success
        }
    );
    assert_status(&harness, deploy.id, DeployStatus::Success).await;
    assert!(harness.scheduler.jobs().is_empty());
}
