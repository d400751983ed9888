use anyhow::{Context, Result};
use shipper::cli::commands::{DeployCommand, HistoryCommand, PlanCommand, RunCommand, StacksCommand};
use shipper::cli::output::*;
use shipper::cli::{Cli, Command};
use shipper::core::config::ShipperConfig;
use shipper::core::{Deploy, DeployId, DeployStatus};
use shipper::execution::{
    ChannelScheduler, DeployExecutor, ExecuteError, Execution, ExecutionEvent, RevisionFetcher,
    WorkspaceFactory,
};
use shipper::persistence::DeployStore;
use shipper::spec::{validate_revision, DeployCommands, PipelineProvider};
use shipper::ShellCommandRunner;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let config = ShipperConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    match &cli.command {
        Command::Deploy(cmd) => create_deploy(cmd, &config).await?,
        Command::Run(cmd) => run_deploy(cmd, &config).await?,
        Command::Plan(cmd) => plan_deploy(cmd, &config)?,
        Command::Stacks(cmd) => list_stacks(cmd, &config).await?,
        Command::History(cmd) => show_history(cmd, &config).await?,
    }

    Ok(())
}

async fn open_store(config: &ShipperConfig) -> Result<Arc<dyn DeployStore>> {
    #[cfg(feature = "sqlite")]
    {
        let store = shipper::persistence::SqliteStore::open(&config.database_path()).await?;
        Ok(Arc::new(store))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        warn!(
            "Built without sqlite, {} is ignored and history is not kept",
            config.database_path().display()
        );
        Ok(Arc::new(shipper::persistence::InMemoryStore::new()))
    }
}

async fn create_deploy(cmd: &DeployCommand, config: &ShipperConfig) -> Result<()> {
    if config.stack(&cmd.stack).is_none() {
        println!("{} Unknown stack {}", CROSS, style(&cmd.stack).bold());
        std::process::exit(1);
    }

    if let Err(e) = validate_revision(&cmd.revision) {
        println!("{} {}", CROSS, style(e).red());
        std::process::exit(1);
    }

    let store = open_store(config).await?;
    store.create_stack(&cmd.stack).await?;

    let deploy = Deploy::new(&cmd.stack, &cmd.revision);
    store.create_deploy(&deploy).await?;
    println!(
        "{} Created deploy {} of {} @ {}",
        INFO,
        style(deploy.id).cyan(),
        style(&deploy.stack).bold(),
        style(deploy.short_commit()).cyan()
    );

    if cmd.no_run {
        return Ok(());
    }

    execute(deploy.id, config, store).await
}

async fn run_deploy(cmd: &RunCommand, config: &ShipperConfig) -> Result<()> {
    let store = open_store(config).await?;
    execute(cmd.deploy_id, config, store).await
}

async fn execute(deploy_id: DeployId, config: &ShipperConfig, store: Arc<dyn DeployStore>) -> Result<()> {
    let provider: Arc<dyn PipelineProvider> = Arc::new(DeployCommands::from_config(config));
    let (scheduler, mut follow_ups) = ChannelScheduler::channel();
    let runner = Arc::new(ShellCommandRunner::new());
    let workspaces = WorkspaceFactory::new(config.workspace_root());

    let spinner = create_spinner();
    let progress = spinner.clone();
    let executor = DeployExecutor::new(runner.clone(), store.clone(), provider.clone(), Arc::new(scheduler))
        .with_workspaces(workspaces.clone())
        .with_command_timeout(config.command_timeout())
        .with_event_handler(move |event| {
            if let ExecutionEvent::CommandStarted { command, .. } = &event {
                progress.set_message(command.clone());
            }
            if let Some(line) = format_execution_event(&event) {
                progress.println(line);
            }
        });

    println!();
    let result = executor.execute(deploy_id).await;
    spinner.finish_and_clear();

    let succeeded = match result {
        Ok(Execution::Skipped { status }) => {
            println!(
                "{} Deploy {} is {}, nothing to do",
                WARN,
                style(&deploy_id.to_string()[..8]).dim(),
                format_status(status)
            );
            status == DeployStatus::Success
        }
        Ok(Execution::Finished { outcome }) => {
            println!("\n{}", format_outcome(&outcome));
            outcome.is_success()
        }
        Err(ExecuteError::NotFound(id)) => {
            println!("{} Deploy {} not found", CROSS, style(id).dim());
            false
        }
        Err(e) => {
            println!("\n{} {}", CROSS, style(format!("{:#}", e)).red());
            false
        }
    };

    // Follow-ups queued by the deploy run before exit
    let fetcher = RevisionFetcher::new(runner, store, provider)
        .with_workspaces(workspaces)
        .with_command_timeout(config.command_timeout());
    while let Ok(job) = follow_ups.try_recv() {
        match fetcher.handle(job).await {
            Ok(Some(revision)) => println!("{} Deployed revision is {}", INFO, style(revision).cyan()),
            Ok(None) => {}
            Err(e) => warn!("Follow-up failed: {:#}", e),
        }
    }

    if !succeeded {
        error!("Deploy {} did not succeed", deploy_id);
        std::process::exit(1);
    }

    Ok(())
}

fn plan_deploy(cmd: &PlanCommand, config: &ShipperConfig) -> Result<()> {
    let Some(stack) = config.stack(&cmd.stack) else {
        println!("{} Unknown stack {}", CROSS, style(&cmd.stack).bold());
        std::process::exit(1);
    };

    let mut stack = stack.clone();
    if let Some(path) = &cmd.path {
        stack.spec = stack.spec.with_discovery(path);
    }
    let capabilities = stack.spec.capabilities(&stack.environment);
    let provider = DeployCommands::new([stack], config.cache_root());

    let deploy = Deploy::new(&cmd.stack, &cmd.revision);
    let pipeline = match provider.discover_stages(&deploy) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            println!("{} {}", CROSS, style(e).red());
            std::process::exit(1);
        }
    };

    if cmd.json {
        let data = serde_json::json!({
            "stack": cmd.stack,
            "revision": cmd.revision,
            "stages": pipeline.stages(),
            "capabilities": capabilities,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!(
        "{} Plan for {} @ {} ({} commands)",
        INFO,
        style(&cmd.stack).bold(),
        style(deploy.short_commit()).cyan(),
        pipeline.command_count()
    );
    println!("{}", format_pipeline(&pipeline));
    Ok(())
}

async fn list_stacks(cmd: &StacksCommand, config: &ShipperConfig) -> Result<()> {
    let store = open_store(config).await?;

    let mut stacks = Vec::new();
    for stack_config in &config.stacks {
        let stack = store.create_stack(&stack_config.name).await?;
        stacks.push(stack);
    }

    if cmd.json {
        let data = serde_json::json!({ "stacks": stacks });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if stacks.is_empty() {
        println!("{} No stacks configured", INFO);
        return Ok(());
    }

    println!("{} Stacks:", INFO);
    for stack in &stacks {
        println!("  {}", format_stack(stack));
    }
    Ok(())
}

async fn show_history(cmd: &HistoryCommand, config: &ShipperConfig) -> Result<()> {
    let store = open_store(config).await?;

    // If specific deploy ID is requested
    if let Some(deploy_id) = cmd.deploy_id {
        match store.find_deploy(deploy_id).await? {
            Some(deploy) if cmd.json => println!("{}", serde_json::to_string_pretty(&deploy)?),
            Some(deploy) => print_deploy_details(&deploy),
            None => println!("{} Deploy not found", WARN),
        }
        return Ok(());
    }

    let deploys = store.list_deploys(cmd.stack.as_deref(), cmd.limit).await?;

    if cmd.json {
        let data = serde_json::json!({ "deploys": deploys });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if deploys.is_empty() {
        println!("{} No deploys found", INFO);
        return Ok(());
    }

    println!("{} Deploy history (showing latest {}):", INFO, cmd.limit);
    for deploy in &deploys {
        println!("  {}", format_deploy_summary(deploy));
    }

    Ok(())
}

fn print_deploy_details(deploy: &Deploy) {
    println!("{} Deploy Details", INFO);
    println!("  ID: {}", style(deploy.id).cyan());
    println!("  Stack: {}", style(&deploy.stack).bold());
    println!("  Revision: {}", style(&deploy.until_commit).cyan());
    println!("  Status: {}", format_status(deploy.status));
    println!("  Created: {}", style(deploy.created_at.to_rfc3339()).dim());
    if let Some(started) = deploy.started_at {
        println!("  Started: {}", style(started.to_rfc3339()).dim());
        if let Some(finished) = deploy.finished_at {
            println!("  Finished: {}", style(finished.to_rfc3339()).dim());
            if let Ok(duration) = finished.signed_duration_since(started).to_std() {
                println!("  Duration: {}", style(format_duration(duration)).dim());
            }
        }
    }

    if !deploy.output.is_empty() {
        println!("\n  {}", style("Output:").bold());
        for line in format_output_tail(&deploy.output, 50).lines() {
            println!("    {}", line);
        }
    }
}
