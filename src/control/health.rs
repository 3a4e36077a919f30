//! Heartbeat health classification for the squad.
//!
//! An agent is `blocked` when it says so; otherwise its health is derived from
//! how long ago it last reported (falling back to its creation time):
//!
//! ```text
//!   minutes < stale_minutes  → healthy  "Active {m}m ago"
//!   minutes < dead_minutes   → stale    "Last seen {m}m ago"
//!   otherwise                → dead     "Inactive {h}h+"
//! ```

use serde::{Deserialize, Serialize};

use super::models::{Agent, AgentStatus};

const MS_PER_MINUTE: i64 = 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Stale,
    Dead,
    Blocked,
}

impl HealthStatus {
    /// Report ordering: problems first.
    fn rank(&self) -> u8 {
        match self {
            Self::Blocked => 0,
            Self::Dead => 1,
            Self::Stale => 2,
            Self::Healthy => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthThresholds {
    #[serde(default = "default_stale_minutes")]
    pub stale_minutes: i64,
    #[serde(default = "default_dead_minutes")]
    pub dead_minutes: i64,
}

fn default_stale_minutes() -> i64 {
    20
}

fn default_dead_minutes() -> i64 {
    60
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            stale_minutes: default_stale_minutes(),
            dead_minutes: default_dead_minutes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub status: HealthStatus,
    pub message: String,
    pub minutes_ago: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthEntry {
    pub agent: Agent,
    pub health: AgentHealth,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCounts {
    pub healthy: usize,
    pub stale: usize,
    pub dead: usize,
    pub blocked: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub agents: Vec<HealthEntry>,
    pub counts: HealthCounts,
}

pub fn classify(agent: &Agent, now_ms: i64, thresholds: &HealthThresholds) -> AgentHealth {
    if agent.status == AgentStatus::Blocked {
        return AgentHealth {
            status: HealthStatus::Blocked,
            message: "Blocked - needs attention".to_string(),
            minutes_ago: None,
        };
    }

    let last_active = agent
        .last_heartbeat
        .filter(|t| *t > 0)
        .or(Some(agent.created_at))
        .filter(|t| *t > 0);
    let Some(last_active) = last_active else {
        return AgentHealth {
            status: HealthStatus::Dead,
            message: "Never seen".to_string(),
            minutes_ago: None,
        };
    };

    let minutes = (now_ms - last_active).max(0) / MS_PER_MINUTE;
    let (status, message) = if minutes < thresholds.stale_minutes {
        (HealthStatus::Healthy, format!("Active {}m ago", minutes))
    } else if minutes < thresholds.dead_minutes {
        (HealthStatus::Stale, format!("Last seen {}m ago", minutes))
    } else {
        (HealthStatus::Dead, format!("Inactive {}h+", minutes / 60))
    };
    AgentHealth {
        status,
        message,
        minutes_ago: Some(minutes),
    }
}

/// Classify every agent and sort blocked, dead, stale, healthy. Agents with
/// the same health keep their input order.
pub fn report(agents: Vec<Agent>, now_ms: i64, thresholds: &HealthThresholds) -> HealthReport {
    let mut entries: Vec<HealthEntry> = agents
        .into_iter()
        .map(|agent| {
            let health = classify(&agent, now_ms, thresholds);
            HealthEntry { agent, health }
        })
        .collect();
    entries.sort_by_key(|e| e.health.status.rank());

    let mut counts = HealthCounts::default();
    for entry in &entries {
        match entry.health.status {
            HealthStatus::Healthy => counts.healthy += 1,
            HealthStatus::Stale => counts.stale += 1,
            HealthStatus::Dead => counts.dead += 1,
            HealthStatus::Blocked => counts.blocked += 1,
        }
    }
    HealthReport {
        agents: entries,
        counts,
    }
}
