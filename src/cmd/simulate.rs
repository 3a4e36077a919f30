//! Agent simulator command: `mc simulate`.

use anyhow::Result;
use console::style;

use mission_control::mission_config::MissionConfig;
use mission_control::simulator::{SIMULATED_AGENTS, Simulator, resolve_endpoint};

pub async fn cmd_simulate(
    config: &MissionConfig,
    url: Option<&str>,
    rounds: Option<usize>,
) -> Result<()> {
    let endpoint = resolve_endpoint(url, config.toml.simulator.url.as_deref())?;
    let simulator = Simulator::new(&endpoint, rounds)?;

    println!();
    println!("{}", style("Mission Control Agent Simulator").magenta());
    println!("{}", style(format!("Endpoint: {}", simulator.base_url())).dim());
    let names: Vec<&str> = SIMULATED_AGENTS.iter().map(|a| a.name).collect();
    println!("{}", style(format!("Agents:   {}", names.join(", "))).dim());
    println!();

    tokio::select! {
        delivered = simulator.run() => {
            println!();
            println!("Simulation finished: {} heartbeat(s) delivered", delivered);
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nStopping simulator...");
        }
    }
    Ok(())
}
