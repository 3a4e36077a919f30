//! The built-in squad used by `mc seed` and `POST /api/seed`.

use super::models::{AgentLevel, AgentStatus};

/// A roster entry. Static so the default squad can live in a `const` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterAgent {
    pub name: &'static str,
    pub role: &'static str,
    pub anime: &'static str,
    pub emoji: &'static str,
    pub avatar_url: &'static str,
    pub level: AgentLevel,
    pub color: &'static str,
    pub status: AgentStatus,
    pub current_task: Option<&'static str>,
}

impl RosterAgent {
    /// Session key agents use to authenticate their webhook calls.
    pub fn session_key(&self) -> String {
        format!("{}-session", self.name.to_lowercase())
    }

    /// Gateway chat id, the lowercase name.
    pub fn chat_id(&self) -> String {
        self.name.to_lowercase()
    }
}

pub const ROSTER: &[RosterAgent] = &[
    RosterAgent {
        name: "Hoyuelo",
        role: "Lead Coordinator",
        anime: "Mob Psycho 100",
        emoji: "\u{1F60A}",
        avatar_url: "/avatars/hoyuelo.png",
        level: AgentLevel::Lead,
        color: "#22c55e",
        status: AgentStatus::Working,
        current_task: Some("Building Mission Control"),
    },
    RosterAgent {
        name: "Reigen",
        role: "Business & Strategy",
        anime: "Mob Psycho 100",
        emoji: "\u{1F3A9}",
        avatar_url: "/avatars/reigen.png",
        level: AgentLevel::Specialist,
        color: "#eab308",
        status: AgentStatus::Idle,
        current_task: None,
    },
    RosterAgent {
        name: "Robin",
        role: "Research & Analysis",
        anime: "One Piece",
        emoji: "\u{1F4DA}",
        avatar_url: "/avatars/robin.png",
        level: AgentLevel::Specialist,
        color: "#8b5cf6",
        status: AgentStatus::Idle,
        current_task: None,
    },
    RosterAgent {
        name: "Franky",
        role: "Developer",
        anime: "One Piece",
        emoji: "\u{1F916}",
        avatar_url: "/avatars/franky.png",
        level: AgentLevel::Specialist,
        color: "#3b82f6",
        status: AgentStatus::Idle,
        current_task: None,
    },
    RosterAgent {
        name: "Nanami",
        role: "Project Management",
        anime: "Jujutsu Kaisen",
        emoji: "\u{1F454}",
        avatar_url: "/avatars/nanami.png",
        level: AgentLevel::Specialist,
        color: "#6366f1",
        status: AgentStatus::Idle,
        current_task: None,
    },
    RosterAgent {
        name: "Frieren",
        role: "Documentation",
        anime: "Frieren",
        emoji: "\u{2744}\u{FE0F}",
        avatar_url: "/avatars/frieren.png",
        level: AgentLevel::Specialist,
        color: "#06b6d4",
        status: AgentStatus::Idle,
        current_task: None,
    },
    RosterAgent {
        name: "Maomao",
        role: "Code Review",
        anime: "Apothecary Diaries",
        emoji: "\u{1F9EA}",
        avatar_url: "/avatars/maomao.png",
        level: AgentLevel::Specialist,
        color: "#ec4899",
        status: AgentStatus::Idle,
        current_task: None,
    },
    RosterAgent {
        name: "Rimuru",
        role: "UI/UX Lead",
        anime: "Slime",
        emoji: "\u{1F535}",
        avatar_url: "/avatars/rimuru.png",
        level: AgentLevel::Specialist,
        color: "#0ea5e9",
        status: AgentStatus::Done,
        current_task: Some("Property Management UI"),
    },
];

/// Look up a roster entry by name, ignoring case.
pub fn find(name: &str) -> Option<&'static RosterAgent> {
    ROSTER.iter().find(|a| a.name.eq_ignore_ascii_case(name))
}
