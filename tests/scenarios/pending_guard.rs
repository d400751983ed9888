//! Test: Pending Guard - only pending deploys run, and only once

use crate::helpers::*;
use shipper::core::{DeployStatus, ExecutionOutcome};
use shipper::execution::{ExecuteError, Execution};
use std::time::Duration;

/// Deploys that are not pending are left alone
#[tokio::test]
async fn test_non_pending_deploys_skipped() {
    for status in [
        DeployStatus::Running,
        DeployStatus::Success,
        DeployStatus::Failed,
        DeployStatus::Error,
    ] {
        let harness = Harness::new(
            MockRunner::new(),
            MockProvider::new(standard_stages(), all_capabilities()),
        );
        let deploy = harness.create_deploy_with_status("S1", status).await;

        let result = harness.executor.execute(deploy.id).await.unwrap();

        assert_eq!(result, Execution::Skipped { status });
        assert_status(&harness, deploy.id, status).await;
        assert!(harness.runner.commands().is_empty());
        assert!(harness.scheduler.jobs().is_empty());
        assert!(harness.events().is_empty());

        // Capabilities are only touched by deploys that run
        assert!(!harness.stack("S1").await.supports_rollback);
    }
}

/// Executing a finished deploy again is a no-op
#[tokio::test]
async fn test_redelivery_after_success() {
    let harness = Harness::new(
        MockRunner::new(),
        MockProvider::new(standard_stages(), all_capabilities()),
    );
    let deploy = harness.create_deploy("S1", "abc123").await;

    let first = harness.executor.execute(deploy.id).await.unwrap();
    let second = harness.executor.execute(deploy.id).await.unwrap();

    assert_eq!(
        first,
        Execution::Finished {
            outcome: ExecutionOutcome::Success
        }
    );
    assert_eq!(
        second,
        Execution::Skipped {
            status: DeployStatus::Success
        }
    );
    assert_eq!(harness.runner.commands().len(), 4);
    assert_eq!(harness.scheduler.jobs().len(), 1);
}

/// Losing the pending -> running claim runs nothing
#[tokio::test]
async fn test_lost_claim_runs_nothing() {
    let harness = Harness::new(
        MockRunner::new(),
        MockProvider::new(standard_stages(), all_capabilities()),
    );
    let deploy = harness.create_deploy("S1", "abc123").await;
    harness.store.lose_claims();

    let result = harness.executor.execute(deploy.id).await.unwrap();

    assert_eq!(
        result,
        Execution::Skipped {
            status: DeployStatus::Running
        }
    );
    assert!(harness.runner.commands().is_empty());
    assert!(harness.leftover_workspaces().is_empty());
    assert!(harness.scheduler.jobs().is_empty());
}

/// Two deliveries of the same deploy at once run the pipeline once
#[tokio::test]
async fn test_concurrent_deliveries_run_once() {
    let harness = Harness::new(
        MockRunner::new().with_delay(Duration::from_millis(20)),
        MockProvider::new(standard_stages(), all_capabilities()),
    );
    let deploy = harness.create_deploy("S1", "abc123").await;

    let (a, b) = tokio::join!(
        harness.executor.execute(deploy.id),
        harness.executor.execute(deploy.id)
    );
    let results = [a.unwrap(), b.unwrap()];

    let finished = results
        .iter()
        .filter(|r| matches!(r, Execution::Finished { .. }))
        .count();
    let skipped = results
        .iter()
        .filter(|r| matches!(r, Execution::Skipped { .. }))
        .count();
    assert_eq!((finished, skipped), (1, 1));
    assert_eq!(harness.runner.commands().len(), 4);
    assert_status(&harness, deploy.id, DeployStatus::Success).await;
}

/// An unknown deploy id is reported and nothing happens
#[tokio::test]
async fn test_missing_deploy_not_found() {
    let harness = Harness::new(
        MockRunner::new(),
        MockProvider::new(standard_stages(), all_capabilities()),
    );
    let id = uuid::Uuid::new_v4();

    let err = harness.executor.execute(id).await.unwrap_err();

    assert!(matches!(err, ExecuteError::NotFound(missing) if missing == id));
    assert!(harness.runner.commands().is_empty());
}
