//! Checkpoint inspection commands: `chorus checkpoints`.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use chorus::checkpoint::recovery::WorkflowRecovery;
use chorus::checkpoint::{CheckpointStatus, CheckpointStore, list_workflows};
use chorus::config::Config;
use chorus::ui::icons::{CHECK, CROSS, HOURGLASS, INFO};

use super::super::{CheckpointCommands, Cli};
use super::load_config;

pub fn cmd_checkpoints(cli: &Cli, project_dir: &Path, command: CheckpointCommands) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let dir = config.checkpoint_dir();

    match command {
        CheckpointCommands::List => {
            let workflows = list_workflows(&dir)
                .with_context(|| format!("Failed to list checkpoints in {}", dir.display()))?;
            if workflows.is_empty() {
                println!("No workflows recorded in {}", dir.display());
                return Ok(());
            }
            println!();
            println!("{:<40} {:>6}  Last updated", "Workflow", "Steps");
            for listing in workflows {
                println!(
                    "{:<40} {:>6}  {}",
                    listing.workflow_id,
                    listing.total_checkpoints,
                    listing.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            println!();
        }
        CheckpointCommands::Status { workflow_id } => {
            let store = open_existing(&config, &workflow_id)?;
            let summary = store.summary();
            let plan = WorkflowRecovery::new(&store).recovery_plan();

            println!();
            println!("Workflow: {}", style(&summary.workflow_id).bold());
            if let Some(prompt) = store.prompt() {
                println!("Prompt:   {}", chorus::util::preview(prompt, 80));
            }
            println!(
                "Records:  {} total, {} completed, {} failed, {} in progress",
                summary.total_checkpoints, summary.completed, summary.failed, summary.in_progress
            );
            println!();
            for record in store.records() {
                let icon = match record.status {
                    CheckpointStatus::Completed => CHECK,
                    CheckpointStatus::Failed => CROSS,
                    CheckpointStatus::InProgress => HOURGLASS,
                };
                print!(
                    "  {}{:<14} {:>7.1}s  {}",
                    icon,
                    record.step_name,
                    record.duration,
                    record.timestamp.format("%H:%M:%S")
                );
                match &record.error {
                    Some(error) => println!("  {}", style(error).red()),
                    None => println!(),
                }
            }
            println!();
            for recommendation in &plan.recommendations {
                println!("{}{}", INFO, recommendation);
            }
            if plan.can_recover {
                println!(
                    "{}",
                    style(format!("Resume with: chorus run --resume {}", summary.workflow_id)).dim()
                );
            }
            println!();
        }
        CheckpointCommands::Clear { workflow_id } => {
            let mut store = open_existing(&config, &workflow_id)?;
            store
                .clear_checkpoints()
                .with_context(|| format!("Failed to clear workflow '{}'", workflow_id))?;
            println!("{}Cleared checkpoints for {}", CHECK, workflow_id);
        }
        CheckpointCommands::Export { workflow_id, path } => {
            let store = open_existing(&config, &workflow_id)?;
            store
                .export_to_file(&path)
                .with_context(|| format!("Failed to export workflow '{}'", workflow_id))?;
            println!(
                "{}Exported {} checkpoint(s) to {}",
                CHECK,
                store.records().len(),
                path.display()
            );
        }
    }

    Ok(())
}

fn open_existing(config: &Config, workflow_id: &str) -> Result<CheckpointStore> {
    let store = CheckpointStore::open(workflow_id, &config.checkpoint_dir())
        .with_context(|| format!("Failed to open checkpoints for workflow '{}'", workflow_id))?;
    if store.records().is_empty() {
        anyhow::bail!("No checkpoints found for workflow '{}'", workflow_id);
    }
    Ok(store)
}
