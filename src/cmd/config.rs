//! Configuration view and validation commands — `foundry config`.

use std::path::Path;

use anyhow::{Context, Result, bail};

use foundry::config::{CONFIG_FILE, FoundryConfig};
use foundry::pipeline::Phase;

use super::super::ConfigCommands;

pub fn cmd_config(path: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = path.unwrap_or(Path::new(CONFIG_FILE));

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Foundry Configuration");
            println!("=====================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No {} found, using defaults", config_path.display());
            }
            println!();

            let mut config = load(path)?;
            config.apply_env()?;
            let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);

            println!("Effective phase settings (with env overrides):");
            let pipeline = config.pipeline_config();
            for phase in Phase::ALL {
                let settings = pipeline.settings(phase);
                println!(
                    "  {}. {:<13} timeout = {:>4}s  recoverable = {}",
                    phase.ordinal(),
                    phase.as_str(),
                    settings.timeout.as_secs(),
                    settings.recoverable
                );
            }
            println!(
                "  implementers = {}, integrators = {}",
                pipeline.implementers, pipeline.integrators
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            let config = load(path)?;
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }
        }
        Some(ConfigCommands::Init { force }) => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            FoundryConfig::default().save(config_path)?;
            println!("Created {}", config_path.display());
        }
    }

    Ok(())
}

fn load(path: Option<&Path>) -> Result<FoundryConfig> {
    FoundryConfig::load_or_default(path)
}
