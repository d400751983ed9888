//! CLI command definitions

use clap::Args;
use std::path::PathBuf;
use uuid::Uuid;

/// Create a deploy and run it
#[derive(Debug, Args, Clone)]
pub struct DeployCommand {
    /// Stack to deploy to
    #[arg(short, long)]
    pub stack: String,

    /// Revision to deploy
    #[arg(short, long)]
    pub revision: String,

    /// Only create the pending deploy
    #[arg(long)]
    pub no_run: bool,
}

/// Execute an existing deploy
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Deploy to execute
    #[arg(long)]
    pub deploy_id: Uuid,
}

/// Show the commands a deploy would run
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    #[arg(short, long)]
    pub stack: String,

    #[arg(short, long)]
    pub revision: String,

    /// Checkout to inspect when the stack declares no packaging
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List configured stacks
#[derive(Debug, Args, Clone)]
pub struct StacksCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show deploy history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Stack name to filter by
    #[arg(short, long)]
    pub stack: Option<String>,

    /// Number of recent deploys to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show one deploy in full
    #[arg(long)]
    pub deploy_id: Option<Uuid>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
