//! Production pipeline provider built from the stack configuration

use crate::core::{
    config::{ShipperConfig, StackConfig},
    Deploy, Pipeline, PipelineStage, StackCapabilities, StageKind,
};
use crate::spec::{PipelineProvider, SpecError};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;

/// Shell-quote a value interpolated into a command
pub(crate) fn quote(value: &str) -> String {
    shell_escape::escape(Cow::Borrowed(value)).into_owned()
}

/// Builds git and deploy-spec commands for configured stacks
///
/// Each stack keeps a mirror of its repository under
/// `<cache_root>/<stack>/git`; deploys clone from that mirror.
#[derive(Debug, Clone)]
pub struct DeployCommands {
    stacks: HashMap<String, StackConfig>,
    cache_root: PathBuf,
}

impl DeployCommands {
    pub fn new<I>(stacks: I, cache_root: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = StackConfig>,
    {
        Self {
            stacks: stacks
                .into_iter()
                .map(|stack| (stack.name.clone(), stack))
                .collect(),
            cache_root: cache_root.into(),
        }
    }

    pub fn from_config(config: &ShipperConfig) -> Self {
        Self::new(config.stacks.iter().cloned(), config.cache_root())
    }

    fn stack(&self, name: &str) -> Result<&StackConfig, SpecError> {
        self.stacks
            .get(name)
            .ok_or_else(|| SpecError::UnknownStack(name.to_string()))
    }

    pub fn git_cache_path(&self, stack: &str) -> PathBuf {
        self.cache_root.join(stack).join("git")
    }

    pub fn bundle_path(&self, stack: &str) -> PathBuf {
        self.cache_root.join(stack).join("bundle")
    }

    /// Create or refresh the stack's mirror
    pub fn fetch_steps(&self, stack: &StackConfig) -> Vec<String> {
        let cache = self.git_cache_path(&stack.name);
        let cache_arg = quote(&cache.to_string_lossy());
        if cache.join("HEAD").exists() {
            vec![format!("git -C {} fetch --quiet --prune origin", cache_arg)]
        } else {
            vec![format!(
                "git clone --quiet --mirror {} {}",
                quote(&stack.repo_url),
                cache_arg
            )]
        }
    }

    /// Clone the mirror into the current working directory
    pub fn clone_steps(&self, stack: &StackConfig) -> Vec<String> {
        let cache = self.git_cache_path(&stack.name);
        vec![format!(
            "git clone --quiet --local {} .",
            quote(&cache.to_string_lossy())
        )]
    }

    pub fn checkout_steps(&self, until_commit: &str) -> Result<Vec<String>, SpecError> {
        validate_revision(until_commit)?;
        Ok(vec![format!("git checkout --quiet {}", quote(until_commit))])
    }
}

/// Reject revisions git would read as an option
pub fn validate_revision(revision: &str) -> Result<(), SpecError> {
    if revision.is_empty() || revision.starts_with('-') {
        return Err(SpecError::InvalidRevision(revision.to_string()));
    }
    Ok(())
}

impl PipelineProvider for DeployCommands {
    fn discover_stages(&self, deploy: &Deploy) -> Result<Pipeline, SpecError> {
        let stack = self.stack(&deploy.stack)?;
        let dependencies = stack.spec.dependency_steps(&self.bundle_path(&stack.name));
        let deploy_steps = stack.spec.deploy_steps(&stack.environment)?;

        let pipeline = Pipeline::new(vec![
            PipelineStage::new(StageKind::Fetch, self.fetch_steps(stack)),
            PipelineStage::new(StageKind::Clone, self.clone_steps(stack)),
            PipelineStage::new(StageKind::Checkout, self.checkout_steps(&deploy.until_commit)?),
            PipelineStage::new(StageKind::InstallDependencies, dependencies),
            PipelineStage::new(StageKind::Deploy, deploy_steps),
        ])?;
        Ok(pipeline)
    }

    fn capabilities(&self, stack: &str) -> Result<StackCapabilities, SpecError> {
        let stack = self.stack(stack)?;
        Ok(stack.spec.capabilities(&stack.environment))
    }

    fn fetch_deployed_revision_steps(&self, stack: &str) -> Result<Vec<String>, SpecError> {
        Ok(self.stack(stack)?.spec.fetch_deployed_revision_steps())
    }
}
