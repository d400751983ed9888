//! External command execution

pub mod error;
pub mod shell;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub use error::CommandError;
pub use shell::ShellCommandRunner;

/// Output of a command that exited zero
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Combined stdout and stderr, in arrival order
    pub output: String,

    pub exit_code: Option<i32>,

    /// Wall-clock time the command took
    pub duration: Duration,
}

impl CommandOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_code: Some(0),
            duration: Duration::ZERO,
        }
    }
}

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one shell command in `working_dir`, bounded by `timeout`
    async fn run(
        &self,
        command: &str,
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError>;
}

#[async_trait]
impl<R: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<R> {
    async fn run(
        &self,
        command: &str,
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        (**self).run(command, working_dir, timeout).await
    }
}
