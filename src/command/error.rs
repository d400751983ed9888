//! Command error types

use std::time::Duration;
use thiserror::Error;

/// Error types for command execution
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command ran to completion with a non-zero exit
    #[error("`{command}` exited with {}", describe_exit(.exit_code))]
    Failed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// The command exceeded its budget and its process group was killed
    #[error("`{command}` timed out after {} seconds", .timeout.as_secs())]
    Timeout {
        command: String,
        timeout: Duration,
        output: String,
    },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::Timeout { .. })
    }

    /// Output captured before the command failed, if any
    pub fn output(&self) -> Option<&str> {
        match self {
            CommandError::Failed { output, .. } | CommandError::Timeout { output, .. } => {
                Some(output)
            }
            _ => None,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (killed by signal)".to_string(),
    }
}
