//! shipper - runs deploy pipelines against stacks and tracks their lifecycle

pub mod cli;
pub mod command;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod spec;

// Re-export commonly used types
pub use command::{CommandError, CommandOutput, CommandRunner, ShellCommandRunner};
pub use core::{Deploy, DeployId, DeployStatus, ExecutionOutcome, Pipeline, PipelineStage, Stack, StageKind};
pub use execution::{DeployExecutor, ExecuteError, Execution, ExecutionEvent, RevisionFetcher};
pub use persistence::{DeployStore, InMemoryStore, StoreError};
pub use spec::{DeployCommands, DeploySpec, PipelineProvider};
