//! Pipeline stage model

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed kinds of stage a deploy pipeline runs, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Update the stack's repository cache
    Fetch,
    /// Clone the cache into the working directory
    Clone,
    /// Check out the target revision
    Checkout,
    /// Install the project's dependencies
    InstallDependencies,
    /// Ship the revision
    Deploy,
}

impl StageKind {
    /// All stage kinds in the order a pipeline runs them
    pub const ORDER: [StageKind; 5] = [
        StageKind::Fetch,
        StageKind::Clone,
        StageKind::Checkout,
        StageKind::InstallDependencies,
        StageKind::Deploy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Fetch => "fetch",
            StageKind::Clone => "clone",
            StageKind::Checkout => "checkout",
            StageKind::InstallDependencies => "install_dependencies",
            StageKind::Deploy => "deploy",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named, ordered group of shell commands
///
/// Stages are produced fresh for every execution and never change once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStage {
    kind: StageKind,
    commands: Vec<String>,
}

impl PipelineStage {
    pub fn new<I, S>(kind: StageKind, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
