//! Configuration for Mission Control, read from `.mission/mission.toml`.
//!
//! Settings are layered file → environment → CLI. A `.env` file in the
//! project directory is loaded (via `dotenvy`) before environment lookups.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3000
//! db_path = ".mission/mission.db"
//! dev_mode = false
//! static_dir = "ui/dist"
//!
//! [gateway]
//! url = "http://localhost:4445"
//! token = "secret"
//! timeout_seconds = 120
//!
//! [gateway.sessions]
//! franky = "franky"
//!
//! [health]
//! stale_minutes = 20
//! dead_minutes = 60
//!
//! [feed]
//! default_limit = 20
//!
//! [simulator]
//! url = "http://localhost:3000"
//!
//! [logging]
//! format = "pretty"
//! log_dir = ".mission/logs"
//! ```
//!
//! Environment overrides:
//!
//! | Variable                 | Overrides            |
//! |--------------------------|----------------------|
//! | `MISSION_CONTROL_PORT`   | `server.port`        |
//! | `MISSION_CONTROL_DB`     | `server.db_path`     |
//! | `OPENCLAW_GATEWAY_URL`   | `gateway.url`        |
//! | `OPENCLAW_GATEWAY_TOKEN` | `gateway.token`      |
//! | `MISSION_CONTROL_URL`    | `simulator.url`      |

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::control::health::HealthThresholds;
use crate::control::roster::ROSTER;
use crate::telemetry::LogFormat;

pub const MISSION_DIR: &str = ".mission";
pub const CONFIG_FILE: &str = "mission.toml";
pub const DEFAULT_DB_FILE: &str = "mission.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// SQLite file; relative paths resolve against the project directory.
    #[serde(default)]
    pub db_path: Option<String>,
    /// Permissive CORS for a separately served dashboard.
    #[serde(default)]
    pub dev_mode: bool,
    /// Directory of built dashboard assets served at `/`.
    #[serde(default)]
    pub static_dir: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: None,
            dev_mode: false,
            static_dir: None,
        }
    }
}

/// Agent-orchestration gateway used by the chat overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySection {
    #[serde(default = "default_gateway_url")]
    pub url: String,
    /// Bearer token. Chat is disabled while unset.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_seconds: u64,
    /// Chat id (lowercase) → gateway session key.
    #[serde(default = "default_gateway_sessions")]
    pub sessions: BTreeMap<String, String>,
}

fn default_gateway_url() -> String {
    "http://localhost:4445".to_string()
}

fn default_gateway_timeout() -> u64 {
    120
}

fn default_gateway_sessions() -> BTreeMap<String, String> {
    ROSTER
        .iter()
        .map(|a| (a.chat_id(), a.chat_id()))
        .collect()
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            token: None,
            timeout_seconds: default_gateway_timeout(),
            sessions: default_gateway_sessions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSection {
    #[serde(default = "default_feed_limit")]
    pub default_limit: usize,
}

fn default_feed_limit() -> usize {
    crate::control::db::DEFAULT_ACTIVITY_LIMIT
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            default_limit: default_feed_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulatorSection {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub log_dir: Option<String>,
}

/// Root of `mission.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissionToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub health: HealthThresholds,
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub simulator: SimulatorSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl MissionToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse mission.toml")
    }

    /// Load `<mission_dir>/mission.toml`, or defaults when it does not exist.
    pub fn load_or_default(mission_dir: &Path) -> Result<Self> {
        let config_path = mission_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize mission.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides using the given lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("MISSION_CONTROL_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid MISSION_CONTROL_PORT '{}'", port))?;
        }
        if let Some(db) = lookup("MISSION_CONTROL_DB") {
            self.server.db_path = Some(db);
        }
        if let Some(url) = lookup("OPENCLAW_GATEWAY_URL") {
            self.gateway.url = url;
        }
        if let Some(token) = lookup("OPENCLAW_GATEWAY_TOKEN").filter(|t| !t.is_empty()) {
            self.gateway.token = Some(token);
        }
        if let Some(url) = lookup("MISSION_CONTROL_URL") {
            self.simulator.url = Some(url);
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; the OS will pick a random port".to_string());
        }
        if self.health.stale_minutes <= 0 {
            warnings.push(format!(
                "health.stale_minutes must be positive (got {})",
                self.health.stale_minutes
            ));
        }
        if self.health.dead_minutes <= self.health.stale_minutes {
            warnings.push(format!(
                "health.dead_minutes ({}) should be greater than stale_minutes ({})",
                self.health.dead_minutes, self.health.stale_minutes
            ));
        }
        if self.feed.default_limit == 0 {
            warnings.push("feed.default_limit is 0; the activity feed will be empty".to_string());
        }
        if !self.gateway.url.starts_with("http://") && !self.gateway.url.starts_with("https://")
        {
            warnings.push(format!(
                "gateway.url '{}' should start with http:// or https://",
                self.gateway.url
            ));
        }
        if self.gateway.timeout_seconds == 0 {
            warnings.push("gateway.timeout_seconds is 0".to_string());
        }
        if self.gateway.sessions.is_empty() {
            warnings.push("gateway.sessions is empty; no agent can be chatted with".to_string());
        }
        for key in self.gateway.sessions.keys() {
            if key.chars().any(|c| c.is_uppercase()) {
                warnings.push(format!(
                    "gateway.sessions key '{}' contains uppercase letters; chat ids are matched lowercase",
                    key
                ));
            }
        }

        warnings
    }
}

/// Resolved configuration for one `mc` invocation.
#[derive(Debug, Clone)]
pub struct MissionConfig {
    pub project_dir: PathBuf,
    pub mission_dir: PathBuf,
    pub toml: MissionToml,
}

impl MissionConfig {
    /// Load `.env` and `mission.toml` from the project directory and apply
    /// environment overrides.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let mission_dir = project_dir.join(MISSION_DIR);

        // A missing .env is normal.
        let _ = dotenvy::from_path(project_dir.join(".env"));

        let mut toml = MissionToml::load_or_default(&mission_dir)?;
        toml.apply_env_from(|key| std::env::var(key).ok())?;

        Ok(Self {
            project_dir,
            mission_dir,
            toml,
        })
    }

    /// Apply `mc serve` flags on top of file and environment settings.
    pub fn with_cli_overrides(
        mut self,
        port: Option<u16>,
        db_path: Option<PathBuf>,
        dev: bool,
    ) -> Self {
        if let Some(port) = port {
            self.toml.server.port = port;
        }
        if let Some(path) = db_path {
            self.toml.server.db_path = Some(path.to_string_lossy().into_owned());
        }
        if dev {
            self.toml.server.dev_mode = true;
        }
        self
    }

    pub fn config_file(&self) -> PathBuf {
        self.mission_dir.join(CONFIG_FILE)
    }

    /// SQLite path (relative settings resolve against the project directory).
    pub fn db_path(&self) -> PathBuf {
        match &self.toml.server.db_path {
            Some(p) => self.resolve(p),
            None => self.mission_dir.join(DEFAULT_DB_FILE),
        }
    }

    pub fn static_dir(&self) -> Option<PathBuf> {
        self.toml.server.static_dir.as_deref().map(|p| self.resolve(p))
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.toml.logging.log_dir.as_deref().map(|p| self.resolve(p))
    }

    pub fn sprites_dir(&self) -> PathBuf {
        match self.static_dir() {
            Some(dir) => dir.join("sprites"),
            None => self.project_dir.join("public").join("sprites"),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.project_dir.join(p)
        }
    }
}
