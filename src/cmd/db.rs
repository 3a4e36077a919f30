//! Database setup commands: `mc init-db`, `mc seed`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use console::style;

use mission_control::control::db::MissionDb;
use mission_control::control::roster::ROSTER;
use mission_control::mission_config::MissionConfig;

fn open_db(config: &MissionConfig, db_path: Option<PathBuf>) -> Result<(MissionDb, PathBuf)> {
    let db_path = match db_path {
        Some(p) => p,
        None => config.db_path(),
    };
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = MissionDb::new(&db_path)?;
    Ok((db, db_path))
}

pub fn cmd_init_db(config: &MissionConfig, db_path: Option<PathBuf>) -> Result<()> {
    let (_db, db_path) = open_db(config, db_path)?;
    println!("Mission database initialized at {}", db_path.display());
    Ok(())
}

pub fn cmd_seed(config: &MissionConfig, clear: bool, db_path: Option<PathBuf>) -> Result<()> {
    let (db, db_path) = open_db(config, db_path)?;

    if clear {
        let deleted = db.clear_agents()?;
        println!("Cleared {} agent(s)", deleted);
    }

    let report = db.seed_agents(ROSTER)?;
    tracing::info!(
        db = %db_path.display(),
        inserted = report.inserted.len(),
        skipped = report.skipped.len(),
        "roster seeded"
    );

    for name in &report.inserted {
        println!("  {} {}", style("+").green(), name);
    }
    for name in &report.skipped {
        println!("  {} {} (already present)", style("=").dim(), style(name).dim());
    }
    println!();
    println!(
        "Seeded {} agent(s); squad now has {} in {}",
        report.inserted.len(),
        report.total,
        db_path.display()
    );
    Ok(())
}
