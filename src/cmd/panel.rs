//! Panel mode command: `chorus panel`.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::sync::Arc;

use chorus::panel::PanelCoordinator;
use chorus::ui::ConsoleObserver;
use chorus::ui::icons::SPARKLE;
use chorus::ui::terminal::print_header;
use chorus::validation::validate_user_prompt;

use super::super::Cli;
use super::{load_config, observer_for};

pub async fn cmd_panel(cli: &Cli, project_dir: &Path, prompt: &str, curator: &str) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let prompt = validate_user_prompt(prompt, config.min_prompt_chars())?;

    let console = Arc::new(ConsoleObserver::new(cli.verbose));
    let observer = observer_for(cli, Arc::clone(&console));
    let registry = Arc::new(config.toml.build_registry(Arc::clone(&observer)));

    let workers = registry.len().saturating_sub(1);
    println!(
        "Asking {} panelist(s) in parallel, curated by {}...",
        workers,
        style(curator).bold()
    );

    let coordinator = PanelCoordinator::new(registry, observer);
    let result = coordinator.mode_panel(&prompt, curator).await;
    console.finish();
    let outcome = result.context("Panel failed")?;

    print_header(&format!("{}Final answer (curated by {})", SPARKLE, outcome.curator));
    println!("{}", outcome.answer.content);
    println!(
        "\n{}",
        style(format!(
            "{} of {} draft(s) used, curation took {:.1}s",
            outcome.accepted_drafts(),
            outcome.workers.len(),
            outcome.answer.duration.as_secs_f64()
        ))
        .dim()
    );
    Ok(())
}
