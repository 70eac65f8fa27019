//! Provider listing: `chorus providers`.

use anyhow::Result;
use console::style;
use std::path::Path;

use chorus::observer;
use chorus::pipeline::Role;

use super::super::Cli;
use super::load_config;

pub fn cmd_providers(cli: &Cli, project_dir: &Path) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let registry = config.toml.build_registry(observer::noop());

    println!();
    println!("Chorus Providers");
    println!("================");
    match &config.source {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none, using defaults)"),
    }
    println!();

    for (name, provider) in registry.iter() {
        let status = if provider.is_available() {
            style("available").green()
        } else {
            style("unavailable").red()
        };
        println!("  {:<20} {}", name, status);
    }

    println!();
    println!("Role priorities:");
    for role in Role::ALL {
        let chain: Vec<String> = config
            .roles()
            .chain(role)
            .iter()
            .map(|name| {
                if registry.is_usable(name) {
                    name.clone()
                } else {
                    format!("{}", style(format!("{} (unusable)", name)).dim())
                }
            })
            .collect();
        println!("  {:<12} {}", role.label(), chain.join(" -> "));
    }

    let warnings = config.toml.validate();
    if !warnings.is_empty() {
        println!();
        for warning in warnings {
            println!("{}", style(format!("warning: {}", warning)).yellow());
        }
    }
    println!();
    Ok(())
}
