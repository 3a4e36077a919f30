//! Dashboard server command: `mc serve`.

use std::path::PathBuf;

use anyhow::Result;

use mission_control::control::server::{ServerConfig, start_server};
use mission_control::mission_config::MissionConfig;

pub async fn cmd_serve(
    config: MissionConfig,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
    open: bool,
) -> Result<()> {
    let config = config.with_cli_overrides(port, db_path, dev);
    for warning in config.validate() {
        tracing::warn!("config: {}", warning);
    }

    let server = ServerConfig::from_config(&config).with_open_browser(open);
    start_server(server).await
}
