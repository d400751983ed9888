//! Test: Timeout Handling - a command exceeds its budget

use crate::helpers::*;
use shipper::core::DeployStatus;
use shipper::execution::{ExecuteError, ExecutionEvent};
use std::time::Duration;

fn clone_times_out() -> MockRunner {
    MockRunner::scripted(vec![("git clone", MockResponse::Timeout)])
}

/// D1 on S1 with git clone timing out: error status, timeout surfaced, nothing after clone
#[tokio::test]
async fn test_d1_clone_times_out() {
    let harness = Harness::new(
        clone_times_out(),
        MockProvider::new(standard_stages(), all_capabilities()),
    );
    let d1 = harness.create_deploy("S1", "abc123").await;

    let err = harness.executor.execute(d1.id).await.unwrap_err();

    match err {
        ExecuteError::Timeout { command, timeout } => {
            assert_eq!(command, "git clone");
            assert_eq!(timeout, Duration::from_secs(5));
        }
        other => panic!("expected a timeout, got {:?}", other),
    }

    assert_commands(&harness.runner, &["git fetch", "git clone"]);
    assert_status(&harness, d1.id, DeployStatus::Error).await;
    assert!(harness.scheduler.jobs().is_empty());
}

/// Status and cleanup happen before the timeout reaches the caller
#[tokio::test]
async fn test_timeout_cleans_up_first() {
    let harness = Harness::new(
        clone_times_out(),
        MockProvider::new(standard_stages(), all_capabilities()),
    );
    let deploy = harness.create_deploy("S1", "abc123").await;

    assert!(harness.executor.execute(deploy.id).await.is_err());

    assert!(harness.leftover_workspaces().is_empty());
    assert!(harness.deploy(deploy.id).await.finished_at.is_some());

    // Capabilities are recorded whatever the outcome
    let s1 = harness.stack("S1").await;
    assert!(s1.supports_rollback);
    assert!(s1.supports_fetch_deployed_revision);

    assert!(matches!(
        harness.events().last(),
        Some(ExecutionEvent::DeployFinished {
            status: DeployStatus::Error,
            ..
        })
    ));
}

/// The killed command is reported without an exit code
#[tokio::test]
async fn test_timed_out_command_has_no_exit_code() {
    let harness = Harness::new(
        clone_times_out(),
        MockProvider::new(standard_stages(), all_capabilities()),
    );
    let deploy = harness.create_deploy("S1", "abc123").await;

    let _ = harness.executor.execute(deploy.id).await;

    let clone_finished = harness.events().into_iter().find_map(|e| match e {
        ExecutionEvent::CommandFinished {
            command, exit_code, ..
        } if command == "git clone" => Some(exit_code),
        _ => None,
    });
    assert_eq!(clone_finished, Some(None));
}
