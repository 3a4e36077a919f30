//! Configuration view and validation commands: `mc config`.

use anyhow::Result;

use mission_control::mission_config::{CONFIG_FILE, MissionConfig, MissionToml};
use mission_control::telemetry::LogFormat;

use super::super::ConfigCommands;

fn print_toml(toml: &MissionToml) {
    println!("[server]");
    println!("  host = \"{}\"", toml.server.host);
    println!("  port = {}", toml.server.port);
    if let Some(path) = &toml.server.db_path {
        println!("  db_path = \"{}\"", path);
    }
    println!("  dev_mode = {}", toml.server.dev_mode);
    if let Some(dir) = &toml.server.static_dir {
        println!("  static_dir = \"{}\"", dir);
    }
    println!();

    println!("[gateway]");
    println!("  url = \"{}\"", toml.gateway.url);
    println!(
        "  token = {}",
        if toml.gateway.token.is_some() {
            "(set)"
        } else {
            "(unset)"
        }
    );
    println!("  timeout_seconds = {}", toml.gateway.timeout_seconds);
    println!(
        "  sessions = {}",
        toml.gateway
            .sessions
            .iter()
            .map(|(chat, session)| format!("{}→{}", chat, session))
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();

    println!("[health]");
    println!("  stale_minutes = {}", toml.health.stale_minutes);
    println!("  dead_minutes = {}", toml.health.dead_minutes);
    println!();

    println!("[feed]");
    println!("  default_limit = {}", toml.feed.default_limit);
    println!();

    if let Some(url) = &toml.simulator.url {
        println!("[simulator]");
        println!("  url = \"{}\"", url);
        println!();
    }

    println!("[logging]");
    let format = match toml.logging.format {
        LogFormat::Pretty => "pretty",
        LogFormat::Json => "json",
    };
    println!("  format = \"{}\"", format);
    if let Some(dir) = &toml.logging.log_dir {
        println!("  log_dir = \"{}\"", dir);
    }
    println!();
}

pub fn cmd_config(config: &MissionConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Mission Control Configuration");
            println!("=============================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                print_toml(&MissionToml::load(&config_path)?);
            } else {
                println!("No {} found at {}", CONFIG_FILE, config_path.display());
                println!();
                println!("Using default configuration:");
                print_toml(&MissionToml::default());
                println!("Run 'mc config init' to create a {} file.", CONFIG_FILE);
                println!();
            }

            println!("Effective values (with env overrides):");
            println!(
                "  listen = {}:{}",
                config.toml.server.host, config.toml.server.port
            );
            println!("  database = {}", config.db_path().display());
            println!("  sprites = {}", config.sprites_dir().display());
            println!(
                "  chat = {}",
                if config.toml.gateway.token.is_some() {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE);
                return Ok(());
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !config.mission_dir.exists() {
                std::fs::create_dir_all(&config.mission_dir)?;
            }

            MissionToml::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, db_path, static_dir");
            println!("  - [gateway] url, timeout_seconds, sessions");
            println!("  - [health] stale_minutes, dead_minutes");
            println!();
        }
    }

    Ok(())
}
