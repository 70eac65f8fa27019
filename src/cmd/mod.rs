//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module        | Commands handled |
//! |---------------|------------------|
//! | `run`         | `Run`            |
//! | `panel`       | `Panel`          |
//! | `providers`   | `Providers`      |
//! | `checkpoints` | `Checkpoints`    |

pub mod checkpoints;
pub mod panel;
pub mod providers;
pub mod run;

pub use checkpoints::cmd_checkpoints;
pub use panel::cmd_panel;
pub use providers::cmd_providers;
pub use run::{RunArgs, cmd_run};

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use chorus::config::Config;
use chorus::observer::{ObserverSet, SharedObserver, TracingObserver};
use chorus::ui::ConsoleObserver;

use super::Cli;

pub(crate) fn load_config(cli: &Cli, project_dir: &Path) -> Result<Config> {
    Config::load(project_dir, cli.config.as_deref())
}

/// Console output, plus `tracing` events when logging is turned up.
pub(crate) fn observer_for(cli: &Cli, console: Arc<ConsoleObserver>) -> SharedObserver {
    if cli.verbose || cli.log_file.is_some() {
        let observers: Vec<SharedObserver> = vec![console, Arc::new(TracingObserver)];
        Arc::new(ObserverSet::new(observers))
    } else {
        console
    }
}
