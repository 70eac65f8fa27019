//! Six-stage workflow command: `chorus run`.

use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chorus::checkpoint::{CheckpointStore, workflow_id};
use chorus::pipeline::PipelineEngine;
use chorus::ui::ConsoleObserver;
use chorus::ui::icons::{FOLDER, PARTY, RESTORE, ROCKET, WARN};
use chorus::ui::terminal::{print_deliverable, print_header, print_stage_summary};
use chorus::validation::{validate_output_dir, validate_user_prompt};

use super::super::Cli;
use super::{load_config, observer_for};

/// Mode segment of generated workflow ids.
const WORKFLOW_MODE: &str = "workflow";

pub struct RunArgs {
    pub prompt: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub resume: Option<String>,
    pub no_checkpoints: bool,
}

pub async fn cmd_run(cli: &Cli, project_dir: &Path, args: RunArgs) -> Result<()> {
    use dialoguer::Input;

    let config = load_config(cli, project_dir)?.with_checkpoints_disabled(args.no_checkpoints);

    let resumed = match &args.resume {
        Some(id) => {
            if !config.checkpoints_enabled() {
                anyhow::bail!("Cannot resume workflow '{}' with checkpoints disabled", id);
            }
            let store = CheckpointStore::open(id, &config.checkpoint_dir())
                .with_context(|| format!("Failed to open checkpoints for workflow '{}'", id))?;
            if store.records().is_empty() {
                anyhow::bail!(
                    "No checkpoints found for workflow '{}'. \
                     Run 'chorus checkpoints list' to see recorded workflows.",
                    id
                );
            }
            Some(store)
        }
        None => None,
    };

    let raw_prompt = match (&args.prompt, resumed.as_ref().and_then(|s| s.prompt())) {
        (Some(prompt), _) => prompt.clone(),
        (None, Some(stored)) => stored.to_string(),
        (None, None) => Input::new()
            .with_prompt("Describe the task")
            .interact_text()
            .context("Failed to read prompt")?,
    };
    let prompt = validate_user_prompt(&raw_prompt, config.min_prompt_chars())?;

    let output_dir = match &args.output_dir {
        Some(dir) => match validate_output_dir(dir, &config.project_dir) {
            Ok(path) => Some(path),
            Err(e) => {
                eprintln!(
                    "{}",
                    style(format!(
                        "{}Invalid output directory: {}. Continuing without saving files.",
                        WARN, e
                    ))
                    .yellow()
                );
                None
            }
        },
        None => None,
    };

    let console = Arc::new(ConsoleObserver::for_workflow(cli.verbose));
    let observer = observer_for(cli, Arc::clone(&console));
    let registry = Arc::new(config.toml.build_registry(Arc::clone(&observer)));

    let mut engine = PipelineEngine::new(
        registry,
        config.toml.retry_policy(),
        config.roles().clone(),
        observer,
    )
    .with_output_dir(output_dir.clone());

    let mut workflow = None;
    if let Some(store) = resumed {
        workflow = Some(store.workflow_id().to_string());
        engine = engine.resume(store);
    } else if config.checkpoints_enabled() {
        let id = workflow_id(WORKFLOW_MODE, &prompt);
        let store = CheckpointStore::open(&id, &config.checkpoint_dir())
            .context("Failed to open checkpoint store")?;
        workflow = Some(id);
        engine = engine.with_checkpoints(store);
    }

    print_header(&format!("{}Starting chorus workflow", ROCKET));
    if let Some(id) = &workflow {
        println!("Workflow ID: {}", style(id).bold());
    }
    let restored = engine.restored_stages();
    if !restored.is_empty() {
        let labels: Vec<&str> = restored.iter().map(|s| s.label()).collect();
        println!("{}Restoring: {}", RESTORE, labels.join(", "));
    }
    if let Some(dir) = &output_dir {
        println!("{}Saving artifacts to {}", FOLDER, dir.display());
    }

    let result = engine
        .run_with_timeout(&prompt, config.toml.workflow_timeout())
        .await;
    console.finish();

    match result {
        Ok(deliverable) => {
            print_header(&format!("{}Workflow complete", PARTY));
            print_deliverable(&deliverable);
            print_stage_summary(&deliverable);
            Ok(())
        }
        Err(e) => {
            if let Some(id) = &workflow {
                eprintln!(
                    "{}",
                    style(format!("Progress saved. Resume with: chorus run --resume {}", id)).dim()
                );
            }
            Err(e).context("Workflow failed")
        }
    }
}
