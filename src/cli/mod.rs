//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{DeployCommand, HistoryCommand, PlanCommand, RunCommand, StacksCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Deploy runner for configured stacks
#[derive(Debug, Parser, Clone)]
#[command(name = "shipper")]
#[command(version)]
#[command(about = "Runs deploy pipelines against stacks and tracks their lifecycle", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the shipper configuration file
    #[arg(short, long, global = true, default_value = "shipper.yml")]
    pub config: PathBuf,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Create a deploy and run it
    Deploy(DeployCommand),

    /// Run an existing pending deploy
    Run(RunCommand),

    /// Print the pipeline a deploy would run
    Plan(PlanCommand),

    /// List stacks
    Stacks(StacksCommand),

    /// Show deploy history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
