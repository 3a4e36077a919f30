use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mission_control::mission_config::MissionConfig;
use mission_control::telemetry::{self, LogFormat, TracingOptions};

mod cmd;

#[derive(Parser)]
#[command(name = "mc")]
#[command(version, about = "Mission control dashboard backend for a squad of AI agents")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Console log format. Overrides [logging] format in mission.toml.
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the dashboard API, agent webhooks and live feed
    Serve {
        /// Port to serve on (defaults to [server] port, then 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (CORS permissive for a local frontend dev server)
        #[arg(long)]
        dev: bool,

        /// Open the dashboard in a browser once the server is listening
        #[arg(long)]
        open: bool,
    },
    /// Create the database and schema without starting the server
    InitDb {
        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Load the built-in agent roster
    Seed {
        /// Remove every agent before seeding
        #[arg(long)]
        clear: bool,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Simulate agents posting heartbeats to a running server
    Simulate {
        /// Server URL (falls back to MISSION_CONTROL_URL, then [simulator] url)
        url: Option<String>,

        /// Heartbeats per agent before stopping (runs until Ctrl+C if unset)
        #[arg(long)]
        rounds: Option<usize>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default mission.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = MissionConfig::new(project_dir)?;

    let _log_guard = telemetry::init_tracing(&TracingOptions {
        verbose: cli.verbose,
        format: cli.log_format.unwrap_or(config.toml.logging.format),
        log_dir: config.log_dir(),
    })?;

    match &cli.command {
        Commands::Serve {
            port,
            db_path,
            dev,
            open,
        } => {
            cmd::cmd_serve(config, *port, db_path.clone(), *dev, *open).await?;
        }
        Commands::InitDb { db_path } => cmd::cmd_init_db(&config, db_path.clone())?,
        Commands::Seed { clear, db_path } => cmd::cmd_seed(&config, *clear, db_path.clone())?,
        Commands::Simulate { url, rounds } => {
            cmd::cmd_simulate(&config, url.as_deref(), *rounds).await?;
        }
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
