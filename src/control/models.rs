use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Seniority tier shown on agent cards: Lead, Specialist, Intern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentLevel {
    #[serde(rename = "LEAD")]
    Lead,
    #[serde(rename = "SPC")]
    Specialist,
    #[serde(rename = "INT")]
    Intern,
}

impl AgentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "LEAD",
            Self::Specialist => "SPC",
            Self::Intern => "INT",
        }
    }
}

impl std::fmt::Display for AgentLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LEAD" => Ok(Self::Lead),
            "SPC" => Ok(Self::Specialist),
            "INT" => Ok(Self::Intern),
            _ => Err(format!("Invalid agent level: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Working,
    Done,
    Blocked,
}

impl AgentStatus {
    pub const ALL: [AgentStatus; 4] = [Self::Idle, Self::Working, Self::Done, Self::Blocked];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Done => "done",
            Self::Blocked => "blocked",
        }
    }

    /// Comma-separated list of valid wire values, as quoted in error messages.
    pub fn allowed() -> String {
        Self::ALL.map(|s| s.as_str()).join(", ")
    }

    /// Squad panel ordering: working first, then blocked, idle, done.
    pub fn squad_rank(&self) -> u8 {
        match self {
            Self::Working => 0,
            Self::Blocked => 1,
            Self::Idle => 2,
            Self::Done => 3,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "working" => Ok(Self::Working),
            "done" => Ok(Self::Done),
            "blocked" => Ok(Self::Blocked),
            _ => Err(format!("Invalid status. Must be one of: {}", Self::allowed())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Inbox,
    Assigned,
    InProgress,
    Review,
    Done,
    Blocked,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        Self::Inbox,
        Self::Assigned,
        Self::InProgress,
        Self::Review,
        Self::Done,
        Self::Blocked,
    ];

    /// Column order on the task board. Blocked work is pinned to the left.
    pub const BOARD_ORDER: [TaskStatus; 6] = [
        Self::Blocked,
        Self::Inbox,
        Self::Assigned,
        Self::InProgress,
        Self::Review,
        Self::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Done => "done",
            Self::Blocked => "blocked",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Inbox => "Inbox",
            Self::Assigned => "Assigned",
            Self::InProgress => "In Progress",
            Self::Review => "Review",
            Self::Done => "Done",
            Self::Blocked => "Blocked",
        }
    }

    pub fn allowed() -> String {
        Self::ALL.map(|s| s.as_str()).join(", ")
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbox" => Ok(Self::Inbox),
            "assigned" => Ok(Self::Assigned),
            "in_progress" => Ok(Self::InProgress),
            "review" => Ok(Self::Review),
            "done" => Ok(Self::Done),
            "blocked" => Ok(Self::Blocked),
            _ => Err(format!("Invalid status. Must be one of: {}", Self::allowed())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Kinds of entries written to the activity log.
///
/// The column is free text; unknown values read back as `Other` so that
/// entries written by newer versions (or by hand) still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    StatusChange,
    TaskCreated,
    AgentAssigned,
    AgentCreated,
    CommentAdded,
    #[serde(untagged)]
    Other(String),
}

impl ActivityType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::StatusChange => "status_change",
            Self::TaskCreated => "task_created",
            Self::AgentAssigned => "agent_assigned",
            Self::AgentCreated => "agent_created",
            Self::CommentAdded => "comment_added",
            Self::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "status_change" => Self::StatusChange,
            "task_created" => Self::TaskCreated,
            "agent_assigned" => Self::AgentAssigned,
            "agent_created" => Self::AgentCreated,
            "comment_added" => Self::CommentAdded,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Rows ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: i64,
    pub name: String,
    pub role: String,
    pub anime: Option<String>,
    pub emoji: Option<String>,
    pub avatar_url: Option<String>,
    pub level: AgentLevel,
    pub status: AgentStatus,
    pub current_task: Option<String>,
    pub color: Option<String>,
    pub session_key: Option<String>,
    /// Epoch milliseconds of the last heartbeat or status report.
    pub last_heartbeat: Option<i64>,
    /// Epoch milliseconds.
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskAssignee {
    pub task_id: i64,
    pub agent_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: i64,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub agent_id: Option<i64>,
    pub task_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub task_id: i64,
    pub agent_id: Option<i64>,
    pub content: String,
    pub created_at: i64,
}

// ── Inputs ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub anime: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub level: AgentLevel,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub session_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, rename = "assigneeIds", alias = "assignee_ids")]
    pub assignee_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewActivity {
    pub activity_type: ActivityType,
    pub agent_id: Option<i64>,
    pub task_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

// ── API view types ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWithAssignees {
    #[serde(flatten)]
    pub task: Task,
    pub assignees: Vec<Agent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityWithRelations {
    #[serde(flatten)]
    pub activity: Activity,
    pub agent: Option<Agent>,
    pub task: Option<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardView {
    pub columns: Vec<BoardColumn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardColumn {
    pub status: TaskStatus,
    pub label: String,
    pub count: usize,
    pub tasks: Vec<TaskWithAssignees>,
}

impl BoardView {
    /// Group tasks into the fixed board columns, preserving input order
    /// within each column. Empty columns are kept so the layout is stable.
    pub fn from_tasks(tasks: Vec<TaskWithAssignees>) -> Self {
        let mut columns: Vec<BoardColumn> = TaskStatus::BOARD_ORDER
            .iter()
            .map(|status| BoardColumn {
                status: *status,
                label: status.label().to_string(),
                count: 0,
                tasks: Vec::new(),
            })
            .collect();
        for task in tasks {
            if let Some(col) = columns.iter_mut().find(|c| c.status == task.task.status) {
                col.tasks.push(task);
            }
        }
        for col in &mut columns {
            col.count = col.tasks.len();
        }
        Self { columns }
    }
}

/// Numbers for the three header cards of the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub active_agents: usize,
    pub total_agents: usize,
    pub blocked_agents: usize,
    pub blocked_tasks: usize,
    pub in_progress_tasks: usize,
    pub total_tasks: usize,
}

impl DashboardStats {
    pub fn compute(agents: &[Agent], tasks: &[Task]) -> Self {
        Self {
            active_agents: agents
                .iter()
                .filter(|a| a.status == AgentStatus::Working)
                .count(),
            total_agents: agents.len(),
            blocked_agents: agents
                .iter()
                .filter(|a| a.status == AgentStatus::Blocked)
                .count(),
            blocked_tasks: tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Blocked)
                .count(),
            in_progress_tasks: tasks
                .iter()
                .filter(|t| t.status == TaskStatus::InProgress)
                .count(),
            total_tasks: tasks.len(),
        }
    }
}

/// Agents in squad-panel order. The sort is stable so agents sharing a
/// status keep their store order.
pub fn squad_order(mut agents: Vec<Agent>) -> Vec<Agent> {
    agents.sort_by_key(|a| a.status.squad_rank());
    agents
}
