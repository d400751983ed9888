//! Shipper configuration from YAML

use crate::spec::DeploySpec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default per-command wall-clock budget
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

/// Top-level configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipperConfig {
    /// SQLite database path (defaults to the local data directory)
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Where per-deploy working directories are created
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Where stack repository mirrors and bundles live
    #[serde(default)]
    pub cache_root: Option<PathBuf>,

    /// Budget applied to every pipeline command (in seconds)
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Deployable stacks
    #[serde(default)]
    pub stacks: Vec<StackConfig>,
}

/// Stack configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    /// Unique stack name
    pub name: String,

    /// Repository to deploy from
    pub repo_url: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Environment passed to deploy tooling
    #[serde(default = "default_environment")]
    pub environment: String,

    /// How this stack installs and deploys
    #[serde(default)]
    pub spec: DeploySpec,
}

fn default_command_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

impl ShipperConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ShipperConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            anyhow::bail!("command_timeout_secs must be greater than zero");
        }

        let mut seen = std::collections::HashSet::new();
        for stack in &self.stacks {
            if stack.name.trim().is_empty() {
                anyhow::bail!("Stack names must not be empty");
            }
            if stack.name.contains('/') || stack.name.contains("..") {
                anyhow::bail!("Stack name '{}' must not contain path separators", stack.name);
            }
            if !seen.insert(&stack.name) {
                anyhow::bail!("Duplicate stack name: {}", stack.name);
            }
            if stack.repo_url.trim().is_empty() {
                anyhow::bail!("Stack '{}' has no repo_url", stack.name);
            }
        }

        Ok(())
    }

    pub fn stack(&self, name: &str) -> Option<&StackConfig> {
        self.stacks.iter().find(|s| s.name == name)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| data_dir().join("shipper.db"))
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| data_dir().join("deploys"))
    }

    pub fn cache_root(&self) -> PathBuf {
        self.cache_root
            .clone()
            .unwrap_or_else(|| data_dir().join("cache"))
    }
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shipper")
}
