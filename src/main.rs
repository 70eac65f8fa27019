use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "chorus")]
#[command(version, about = "Multi-provider AI orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to chorus.toml (defaults to $CHORUS_CONFIG, ./chorus.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Write structured logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the six-stage workflow: plan, code, test, review, refine, document
    Run {
        /// Task description (prompted for when omitted)
        prompt: Option<String>,

        /// Directory for stage artifacts, relative to the project directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Resume a previous workflow by id
        #[arg(long)]
        resume: Option<String>,

        /// Do not record checkpoints for this run
        #[arg(long)]
        no_checkpoints: bool,
    },
    /// Ask every provider in parallel and have a curator merge the drafts
    Panel {
        prompt: String,

        /// Provider that synthesizes the final answer
        #[arg(long, default_value = "claude")]
        curator: String,
    },
    /// List configured providers and whether they are available
    Providers,
    /// Inspect or manage workflow checkpoints
    Checkpoints {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum CheckpointCommands {
    /// List recorded workflows, newest first
    List,
    /// Show progress and the recovery plan for a workflow
    Status { workflow_id: String },
    /// Delete a workflow's checkpoints
    Clear { workflow_id: String },
    /// Export a workflow's checkpoints to a JSON file
    Export { workflow_id: String, path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = chorus::logging::init(cli.verbose, cli.log_file.as_deref())?;

    let project_dir = std::env::current_dir().context("Failed to get current directory")?;

    match &cli.command {
        Commands::Run {
            prompt,
            output_dir,
            resume,
            no_checkpoints,
        } => {
            cmd::cmd_run(
                &cli,
                &project_dir,
                cmd::RunArgs {
                    prompt: prompt.clone(),
                    output_dir: output_dir.clone(),
                    resume: resume.clone(),
                    no_checkpoints: *no_checkpoints,
                },
            )
            .await?
        }
        Commands::Panel { prompt, curator } => {
            cmd::cmd_panel(&cli, &project_dir, prompt, curator).await?
        }
        Commands::Providers => cmd::cmd_providers(&cli, &project_dir)?,
        Commands::Checkpoints { command } => {
            cmd::cmd_checkpoints(&cli, &project_dir, command.clone())?
        }
    }

    Ok(())
}
