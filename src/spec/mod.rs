//! Deploy specs: what a stack runs to install and ship a revision

pub mod commands;
pub mod discovery;

pub use commands::{validate_revision, DeployCommands};
pub use discovery::detect_packaging;

use crate::core::{Deploy, InvalidPipeline, Pipeline, StackCapabilities};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while turning a deploy spec into commands
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("unknown stack '{0}'")]
    UnknownStack(String),

    #[error("impossible to detect how to deploy this application, declare `deploy` steps in the stack spec")]
    UndiscoverableDeploySteps,

    #[error("gem packaging requires a gemspec")]
    MissingGemspec,

    #[error("invalid revision '{0}'")]
    InvalidRevision(String),

    #[error(transparent)]
    InvalidPipeline(#[from] InvalidPipeline),
}

/// Source of the stage list and capabilities for a deploy
///
/// Implementations are synchronous and must not run commands themselves.
pub trait PipelineProvider: Send + Sync {
    /// Ordered stages to run for this deploy's target revision
    fn discover_stages(&self, deploy: &Deploy) -> Result<Pipeline, SpecError>;

    /// Capabilities the stack currently declares
    fn capabilities(&self, stack: &str) -> Result<StackCapabilities, SpecError>;

    /// Commands that print the revision currently running on the stack
    fn fetch_deployed_revision_steps(&self, stack: &str) -> Result<Vec<String>, SpecError>;
}

/// How the project is packaged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Packaging {
    #[default]
    None,
    Bundler,
    Gem,
    Capistrano,
}

impl Packaging {
    fn uses_bundler(&self) -> bool {
        !matches!(self, Packaging::None)
    }
}

/// Per-stack deploy declaration
///
/// Explicit step lists always win over what the packaging type implies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySpec {
    pub packaging: Packaging,

    /// Gemspec file name, required for gem packaging
    pub gemspec: Option<String>,

    /// Overrides dependency installation
    pub dependencies: Option<Vec<String>>,

    /// Overrides the deploy steps
    pub deploy: Option<Vec<String>>,

    /// Overrides the rollback steps
    pub rollback: Option<Vec<String>>,

    /// Commands printing the deployed revision
    pub fetch: Option<Vec<String>>,
}

impl DeploySpec {
    /// Fill in packaging from a checkout when none was declared
    pub fn with_discovery(mut self, dir: &Path) -> Self {
        if self.packaging == Packaging::None {
            let (packaging, gemspec) = detect_packaging(dir);
            self.packaging = packaging;
            if self.gemspec.is_none() {
                self.gemspec = gemspec;
            }
        }
        self
    }

    pub fn dependency_steps(&self, bundle_path: &Path) -> Vec<String> {
        if let Some(steps) = &self.dependencies {
            return steps.clone();
        }
        if self.packaging.uses_bundler() {
            let path = commands::quote(&bundle_path.to_string_lossy());
            return vec![format!(
                "bundle check --path={path} || bundle install --frozen --path={path} --retry=2"
            )];
        }
        Vec::new()
    }

    pub fn deploy_steps(&self, environment: &str) -> Result<Vec<String>, SpecError> {
        if let Some(steps) = &self.deploy {
            return Ok(steps.clone());
        }
        match self.packaging {
            Packaging::Gem => self.publish_gem(),
            Packaging::Capistrano => Ok(vec![format!(
                "bundle exec cap {} deploy",
                commands::quote(environment)
            )]),
            Packaging::Bundler | Packaging::None => Err(SpecError::UndiscoverableDeploySteps),
        }
    }

    pub fn rollback_steps(&self, environment: &str) -> Vec<String> {
        if let Some(steps) = &self.rollback {
            return steps.clone();
        }
        match self.packaging {
            Packaging::Capistrano => vec![format!(
                "bundle exec cap {} deploy:rollback",
                commands::quote(environment)
            )],
            _ => Vec::new(),
        }
    }

    pub fn fetch_deployed_revision_steps(&self) -> Vec<String> {
        self.fetch.clone().unwrap_or_default()
    }

    pub fn supports_rollback(&self, environment: &str) -> bool {
        !self.rollback_steps(environment).is_empty()
    }

    pub fn supports_fetch_deployed_revision(&self) -> bool {
        self.fetch.as_ref().is_some_and(|steps| !steps.is_empty())
    }

    pub fn capabilities(&self, environment: &str) -> StackCapabilities {
        StackCapabilities {
            rollback: self.supports_rollback(environment),
            fetch_deployed_revision: self.supports_fetch_deployed_revision(),
        }
    }

    fn publish_gem(&self) -> Result<Vec<String>, SpecError> {
        let gemspec = self.gemspec.as_deref().ok_or(SpecError::MissingGemspec)?;
        Ok(vec![
            format!("assert-gem-version-tag {}", commands::quote(gemspec)),
            "bundle exec rake release".to_string(),
        ])
    }
}
