//! CLI output formatting

use crate::{
    core::{Deploy, DeployStatus, ExecutionOutcome, Pipeline, Stack},
    execution::ExecutionEvent,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a spinner for a running deploy
pub fn create_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(spinner_style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
    {
        spinner.set_style(spinner_style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a deploy status for display
pub fn format_status(status: DeployStatus) -> String {
    match status {
        DeployStatus::Pending => style("PENDING").dim().to_string(),
        DeployStatus::Running => style("RUNNING").yellow().to_string(),
        DeployStatus::Success => style("SUCCESS").green().to_string(),
        DeployStatus::Failed => style("FAILED").red().to_string(),
        DeployStatus::Error => style("ERROR").red().bold().to_string(),
    }
}

fn status_icon(status: DeployStatus) -> Emoji<'static, 'static> {
    match status {
        DeployStatus::Success => CHECK,
        DeployStatus::Failed | DeployStatus::Error => CROSS,
        DeployStatus::Running => SPINNER,
        DeployStatus::Pending => INFO,
    }
}

/// One-line summary of a deploy
pub fn format_deploy_summary(deploy: &Deploy) -> String {
    format!(
        "{} {} - {} @ {} - {} - {}",
        status_icon(deploy.status),
        style(deploy.short_id()).dim(),
        style(&deploy.stack).bold(),
        style(deploy.short_commit()).cyan(),
        format_status(deploy.status),
        style(deploy.created_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

/// One-line summary of a stack record
pub fn format_stack(stack: &Stack) -> String {
    let flag = |enabled: bool| {
        if enabled {
            style("yes").green().to_string()
        } else {
            style("no").dim().to_string()
        }
    };
    format!(
        "{} - rollback: {} - fetch revision: {} - deployed: {}",
        style(&stack.name).bold(),
        flag(stack.supports_rollback),
        flag(stack.supports_fetch_deployed_revision),
        stack
            .deployed_revision
            .as_deref()
            .map(|rev| style(rev).cyan().to_string())
            .unwrap_or_else(|| style("unknown").dim().to_string())
    )
}

/// Render a pipeline, one stage per block
pub fn format_pipeline(pipeline: &Pipeline) -> String {
    let mut lines = Vec::new();
    for stage in pipeline.stages() {
        lines.push(format!("{}", style(stage.name()).bold()));
        if stage.is_empty() {
            lines.push(format!("  {}", style("(nothing to run)").dim()));
        }
        for command in stage.commands() {
            lines.push(format!("  $ {}", command));
        }
    }
    lines.join("\n")
}

/// Format an execution event for display
///
/// Returns `None` for events that only move the spinner.
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    match event {
        ExecutionEvent::DeployStarted {
            deploy_id,
            stack,
            until_commit,
            command_count,
        } => Some(format!(
            "{} Deploying {} @ {} ({}, {} commands)",
            ROCKET,
            style(stack).bold(),
            style(until_commit).cyan(),
            style(&deploy_id.to_string()[..8]).dim(),
            command_count
        )),
        ExecutionEvent::StageStarted { stage, .. } => {
            Some(format!("{} {}", INFO, style(stage).cyan()))
        }
        ExecutionEvent::CommandStarted { .. } => None,
        ExecutionEvent::CommandFinished {
            command,
            exit_code,
            duration,
            ..
        } => {
            let icon = if *exit_code == Some(0) { CHECK } else { CROSS };
            Some(format!(
                "  {}{} {}",
                icon,
                command,
                style(format!("({})", format_duration(*duration))).dim()
            ))
        }
        ExecutionEvent::DeployFinished { deploy_id, status } => Some(format!(
            "{} Deploy ({}) finished: {}",
            status_icon(*status),
            style(&deploy_id.to_string()[..8]).dim(),
            format_status(*status)
        )),
    }
}

/// Explain why a finished deploy did not succeed
pub fn format_outcome(outcome: &ExecutionOutcome) -> String {
    match outcome {
        ExecutionOutcome::Success => format!("{} completed {}", CHECK, style("successfully").green()),
        ExecutionOutcome::CommandFailure {
            stage,
            command,
            exit_code,
            output,
        } => {
            let code = exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let mut text = format!(
                "{} {} failed in {} (exit {})",
                CROSS,
                style(command).bold(),
                style(stage).cyan(),
                style(code).red()
            );
            if !output.trim().is_empty() {
                text.push('\n');
                text.push_str(&format_output_tail(output, 20));
            }
            text
        }
        ExecutionOutcome::Timeout {
            stage,
            command,
            timeout,
        } => format!(
            "{} {} timed out in {} after {}",
            CROSS,
            style(command).bold(),
            style(stage).cyan(),
            format_duration(*timeout)
        ),
        ExecutionOutcome::UnexpectedError { cause } => {
            format!("{} unexpected error: {}", CROSS, style(cause).red())
        }
    }
}

/// Keep only the last `max_lines` lines of output
pub fn format_output_tail(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.trim_end().to_string()
    } else {
        format!(
            "{}... ({} earlier lines)\n{}",
            style("[truncated]").dim(),
            lines.len() - max_lines,
            lines[lines.len() - max_lines..].join("\n")
        )
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
