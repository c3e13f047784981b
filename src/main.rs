use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use foundry::config::FoundryConfig;
use foundry::logging::{LogOptions, init_logging};

mod cmd;

#[derive(Parser)]
#[command(name = "foundry")]
#[command(version, about = "Staged project generation pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to foundry.toml (defaults to ./foundry.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate one project and wait for its archive
    Run {
        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        description: String,

        /// web_app, ai_ml, full_stack or data_analysis
        #[arg(short, long, default_value = "web_app")]
        category: String,

        /// Extra requirement (repeatable)
        #[arg(short, long = "requirement")]
        requirements: Vec<String>,
    },
    /// Serve the HTTP API
    Serve {
        /// Port to serve on (overrides [server].port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable dev mode (permissive CORS, bind on all interfaces)
        #[arg(long)]
        dev: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default foundry.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // Config commands inspect the file itself and must work when it is broken.
    if let Commands::Config { command } = &cli.command {
        return cmd::cmd_config(cli.config.as_deref(), command.clone());
    }

    let mut config = FoundryConfig::load_or_default(cli.config.as_deref())?;
    config.apply_env()?;

    let _log_guard = init_logging(&LogOptions {
        verbose: cli.verbose,
        json: cli.log_json || config.logging.json,
        file_dir: config.logging.file.then(|| config.logs_dir()),
    })?;

    match cli.command {
        Commands::Run {
            title,
            description,
            category,
            requirements,
        } => {
            cmd::cmd_run(&config, title, description, &category, requirements).await?;
        }
        Commands::Serve { port, dev } => {
            cmd::cmd_serve(&config, port, dev).await?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}
