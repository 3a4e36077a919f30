//! Agent simulator: drives the heartbeat webhook so the dashboard has
//! something to show without real agents attached.
//!
//! Each simulated agent walks the status cycle idle → working → done →
//! blocked, picking one of its canned tasks while working, and reports every
//! step to `POST {url}/agent/heartbeat`. Agents start staggered and sleep a
//! random interval between reports. Delivery failures are logged and the
//! loop carries on.

use std::ops::Range;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use console::style;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::control::models::AgentStatus;

pub struct SimulatedAgent {
    pub name: &'static str,
    pub session_key: &'static str,
    pub tasks: &'static [&'static str],
}

pub const SIMULATED_AGENTS: &[SimulatedAgent] = &[
    SimulatedAgent {
        name: "Hoyuelo",
        session_key: "hoyuelo-session",
        tasks: &[
            "Building Mission Control",
            "Coordinating sprint planning",
            "Reviewing architecture decisions",
            "Setting up team workflows",
        ],
    },
    SimulatedAgent {
        name: "Reigen",
        session_key: "reigen-session",
        tasks: &[
            "Processing emails",
            "Drafting client proposals",
            "Updating business metrics",
            "Running competitive analysis",
        ],
    },
    SimulatedAgent {
        name: "Robin",
        session_key: "robin-session",
        tasks: &[
            "Analyzing data patterns",
            "Writing research report",
            "Investigating API performance",
            "Cross-referencing documentation",
        ],
    },
    SimulatedAgent {
        name: "Franky",
        session_key: "franky-session",
        tasks: &[
            "Deploying new build",
            "Fixing CI pipeline",
            "Refactoring auth module",
            "Writing integration tests",
        ],
    },
];

pub const STATUS_CYCLE: [AgentStatus; 4] = [
    AgentStatus::Idle,
    AgentStatus::Working,
    AgentStatus::Done,
    AgentStatus::Blocked,
];

/// Status an agent reports on its `round`-th heartbeat.
pub fn status_for_round(round: usize) -> AgentStatus {
    STATUS_CYCLE[round % STATUS_CYCLE.len()]
}

/// Pick the endpoint: explicit argument first, then the configured URL
/// (which already carries any `MISSION_CONTROL_URL` override).
pub fn resolve_endpoint(arg: Option<&str>, configured: Option<&str>) -> Result<String> {
    let url = arg
        .filter(|u| !u.trim().is_empty())
        .or(configured.filter(|u| !u.trim().is_empty()));
    match url {
        Some(url) => Ok(url.trim().trim_end_matches('/').to_string()),
        None => bail!(
            "No Mission Control URL found. Provide it as:\n  \
             1. CLI argument:  mc simulate http://localhost:3000\n  \
             2. Env var:       MISSION_CONTROL_URL=http://localhost:3000 mc simulate\n  \
             3. Config:        [simulator] url = \"http://localhost:3000\" in .mission/mission.toml"
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub session_key: String,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
}

/// Build the heartbeat for `agent` on its `round`-th step.
pub fn heartbeat_for<R: Rng + ?Sized>(
    agent: &SimulatedAgent,
    round: usize,
    rng: &mut R,
) -> HeartbeatPayload {
    let status = status_for_round(round);
    let current_task = match status {
        AgentStatus::Working => agent.tasks.choose(rng).map(|t| t.to_string()),
        _ => None,
    };
    HeartbeatPayload {
        session_key: agent.session_key.to_string(),
        status,
        current_task,
    }
}

pub struct Simulator {
    client: reqwest::Client,
    base_url: String,
    /// Stop each agent after this many heartbeats; `None` runs forever.
    rounds: Option<usize>,
    delay_ms: Range<u64>,
    stagger: Duration,
}

impl Simulator {
    pub fn new(base_url: &str, rounds: Option<usize>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rounds,
            delay_ms: 2000..5000,
            stagger: Duration::from_millis(800),
        })
    }

    /// Override the pause between heartbeats and the start stagger.
    pub fn with_timing(mut self, delay_ms: Range<u64>, stagger: Duration) -> Self {
        self.delay_ms = delay_ms;
        self.stagger = stagger;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST one heartbeat. Non-2xx answers are errors carrying the body.
    pub async fn send(&self, payload: &HeartbeatPayload) -> Result<()> {
        let url = format!("{}/agent/heartbeat", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            bail!("{} - {}", status.as_u16(), body);
        }
        Ok(())
    }

    async fn run_agent(&self, index: usize, agent: &SimulatedAgent) -> usize {
        tokio::time::sleep(self.stagger * index as u32).await;
        let mut rng = StdRng::from_entropy();
        let mut delivered = 0;
        let mut round = 0;

        while self.rounds.is_none_or(|max| round < max) {
            let payload = heartbeat_for(agent, round, &mut rng);
            print_step(agent, &payload);
            match self.send(&payload).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(agent = agent.name, error = %format!("{:#}", e), "heartbeat failed"),
            }
            round += 1;
            if self.rounds.is_some_and(|max| round >= max) {
                break;
            }
            let delay = if self.delay_ms.is_empty() {
                self.delay_ms.start
            } else {
                rng.gen_range(self.delay_ms.clone())
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        delivered
    }

    /// Run every simulated agent concurrently. Returns the number of
    /// heartbeats accepted by the server.
    pub async fn run(&self) -> usize {
        let runs = SIMULATED_AGENTS
            .iter()
            .enumerate()
            .map(|(i, agent)| self.run_agent(i, agent));
        futures_util::future::join_all(runs).await.into_iter().sum()
    }
}

fn print_step(agent: &SimulatedAgent, payload: &HeartbeatPayload) {
    let status = format!("{:<8}", payload.status.as_str());
    let status = match payload.status {
        AgentStatus::Idle => style(status).dim(),
        AgentStatus::Working => style(status).green(),
        AgentStatus::Done => style(status).blue(),
        AgentStatus::Blocked => style(status).red(),
    };
    let task = payload
        .current_task
        .as_deref()
        .map(|t| format!(" -> \"{}\"", t))
        .unwrap_or_default();
    println!(
        "{} {} {}{}",
        style(format!("[{}]", chrono::Local::now().format("%H:%M:%S"))).dim(),
        style(format!("{:<10}", agent.name)).cyan(),
        status,
        task
    );
}
