use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

use super::models::*;
use super::roster::RosterAgent;
use crate::errors::MissionError;

/// Default number of activity-feed entries returned when no limit is given.
pub const DEFAULT_ACTIVITY_LIMIT: usize = 20;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Async-safe handle to the mission database.
///
/// Wraps `MissionDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<MissionDb>>,
}

impl DbHandle {
    pub fn new(db: MissionDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&MissionDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| MissionError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. For startup work and tests;
    /// never call this from a request handler.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, MissionDb>> {
        self.inner
            .lock()
            .map_err(|_| MissionError::LockPoisoned.into())
    }
}

/// Result of an agent status change: the updated row, the status it replaced
/// and the activity entry written for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusChange {
    pub agent: Agent,
    pub previous: AgentStatus,
    pub activity: Activity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusChange {
    pub task: Task,
    pub previous: TaskStatus,
    pub activity: Activity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedReport {
    pub inserted: Vec<String>,
    pub skipped: Vec<String>,
    pub total: usize,
}

pub struct MissionDb {
    conn: Connection,
}

const AGENT_COLUMNS: &str = "id, name, role, anime, emoji, avatar_url, level, status, current_task, color, session_key, last_heartbeat, created_at";
const TASK_COLUMNS: &str =
    "id, title, description, status, priority, tags, created_at, updated_at";
const ACTIVITY_COLUMNS: &str =
    "id, type, agent_id, task_id, title, description, message, metadata, created_at";

impl MissionDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS agents (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    role TEXT NOT NULL,
                    anime TEXT,
                    emoji TEXT,
                    avatar_url TEXT,
                    level TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'idle',
                    current_task TEXT,
                    color TEXT,
                    session_key TEXT,
                    last_heartbeat INTEGER,
                    created_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT,
                    status TEXT NOT NULL DEFAULT 'inbox',
                    priority TEXT NOT NULL DEFAULT 'medium',
                    tags TEXT NOT NULL DEFAULT '[]',
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS task_assignees (
                    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                    agent_id INTEGER NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
                    PRIMARY KEY (task_id, agent_id)
                );

                CREATE TABLE IF NOT EXISTS activities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    type TEXT NOT NULL,
                    agent_id INTEGER REFERENCES agents(id) ON DELETE SET NULL,
                    task_id INTEGER REFERENCES tasks(id) ON DELETE SET NULL,
                    title TEXT NOT NULL,
                    description TEXT,
                    message TEXT NOT NULL,
                    metadata TEXT,
                    created_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS comments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                    agent_id INTEGER REFERENCES agents(id) ON DELETE SET NULL,
                    content TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_agents_status ON agents(status);
                CREATE UNIQUE INDEX IF NOT EXISTS idx_agents_session_key
                    ON agents(session_key) WHERE session_key IS NOT NULL;
                CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
                CREATE INDEX IF NOT EXISTS idx_tasks_priority ON tasks(priority);
                CREATE INDEX IF NOT EXISTS idx_task_assignees_agent ON task_assignees(agent_id);
                CREATE INDEX IF NOT EXISTS idx_activities_agent ON activities(agent_id);
                CREATE INDEX IF NOT EXISTS idx_activities_task ON activities(task_id);
                CREATE INDEX IF NOT EXISTS idx_activities_type ON activities(type);
                CREATE INDEX IF NOT EXISTS idx_comments_task ON comments(task_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Agents ────────────────────────────────────────────────────────

    pub fn create_agent(&self, agent: &NewAgent) -> Result<(Agent, Activity)> {
        let now = now_ms();
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        self.conn
            .execute(
                "INSERT INTO agents (name, role, anime, emoji, avatar_url, level, status, color, session_key, last_heartbeat, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'idle', ?7, ?8, ?9, ?9)",
                params![
                    agent.name,
                    agent.role,
                    agent.anime,
                    agent.emoji,
                    agent.avatar_url,
                    agent.level.as_str(),
                    agent.color,
                    agent.session_key,
                    now,
                ],
            )
            .context("Failed to insert agent")?;
        let id = self.conn.last_insert_rowid();
        let created = self.get_agent(id)?.context("Agent not found after insert")?;
        let activity = self.log_activity(&NewActivity {
            activity_type: ActivityType::AgentCreated,
            agent_id: Some(id),
            task_id: None,
            title: format!("{} joined the squad", created.name),
            description: None,
            message: format!("{} ({}) was added as {}", created.name, created.role, created.level),
            metadata: None,
        })?;
        tx.commit().context("Failed to commit agent insert")?;
        Ok((created, activity))
    }

    /// All agents, newest first.
    pub fn list_agents(&self) -> Result<Vec<Agent>> {
        self.query_agents(
            &format!("SELECT {} FROM agents ORDER BY id DESC", AGENT_COLUMNS),
            params![],
        )
    }

    pub fn get_agent(&self, id: i64) -> Result<Option<Agent>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM agents WHERE id = ?1", AGENT_COLUMNS),
                params![id],
                AgentRow::from_row,
            )
            .optional()
            .context("Failed to query agent")?;
        row.map(AgentRow::into_agent).transpose()
    }

    pub fn agents_by_status(&self, status: AgentStatus) -> Result<Vec<Agent>> {
        self.query_agents(
            &format!(
                "SELECT {} FROM agents WHERE status = ?1 ORDER BY id DESC",
                AGENT_COLUMNS
            ),
            params![status.as_str()],
        )
    }

    pub fn agent_by_session_key(&self, session_key: &str) -> Result<Option<Agent>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM agents WHERE session_key = ?1", AGENT_COLUMNS),
                params![session_key],
                AgentRow::from_row,
            )
            .optional()
            .context("Failed to query agent by session key")?;
        row.map(AgentRow::into_agent).transpose()
    }

    /// Set an agent's status and current task, refresh its heartbeat, and log
    /// a `status_change` activity carrying the before/after statuses.
    pub fn update_agent_status(
        &self,
        id: i64,
        status: AgentStatus,
        current_task: Option<&str>,
    ) -> Result<AgentStatusChange> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let before = self
            .get_agent(id)?
            .ok_or(MissionError::AgentNotFound { id })?;

        self.conn
            .execute(
                "UPDATE agents SET status = ?1, current_task = ?2, last_heartbeat = ?3 WHERE id = ?4",
                params![status.as_str(), current_task, now_ms(), id],
            )
            .context("Failed to update agent status")?;

        let activity = self.log_activity(&NewActivity {
            activity_type: ActivityType::StatusChange,
            agent_id: Some(id),
            task_id: None,
            title: format!("{} is now {}", before.name, status),
            description: current_task.map(str::to_string),
            message: format!("Agent status changed to {}", status),
            metadata: Some(serde_json::json!({
                "previous_status": before.status,
                "new_status": status,
            })),
        })?;
        let agent = self
            .get_agent(id)?
            .context("Agent not found after status update")?;
        tx.commit().context("Failed to commit agent status update")?;

        Ok(AgentStatusChange {
            agent,
            previous: before.status,
            activity,
        })
    }

    /// Refresh an agent's heartbeat without touching its status.
    pub fn heartbeat(&self, id: i64) -> Result<Agent> {
        let changed = self
            .conn
            .execute(
                "UPDATE agents SET last_heartbeat = ?1 WHERE id = ?2",
                params![now_ms(), id],
            )
            .context("Failed to record heartbeat")?;
        if changed == 0 {
            return Err(MissionError::AgentNotFound { id }.into());
        }
        self.get_agent(id)?
            .context("Agent not found after heartbeat")
    }

    pub fn delete_agent(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM agents WHERE id = ?1", params![id])
            .context("Failed to delete agent")?;
        Ok(deleted > 0)
    }

    /// Remove every agent. Returns the number of rows deleted.
    pub fn clear_agents(&self) -> Result<usize> {
        self.conn
            .execute("DELETE FROM agents", [])
            .context("Failed to clear agents")
    }

    /// Insert roster entries whose names are not yet present.
    pub fn seed_agents(&self, roster: &[RosterAgent]) -> Result<SeedReport> {
        let existing: Vec<String> = self.list_agents()?.into_iter().map(|a| a.name).collect();
        let now = now_ms();
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let mut report = SeedReport::default();
        for entry in roster {
            if existing.iter().any(|name| name == entry.name) {
                report.skipped.push(entry.name.to_string());
                continue;
            }
            self.conn
                .execute(
                    "INSERT INTO agents (name, role, anime, emoji, avatar_url, level, status, current_task, color, session_key, last_heartbeat, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                    params![
                        entry.name,
                        entry.role,
                        entry.anime,
                        entry.emoji,
                        entry.avatar_url,
                        entry.level.as_str(),
                        entry.status.as_str(),
                        entry.current_task,
                        entry.color,
                        entry.session_key(),
                        now,
                    ],
                )
                .with_context(|| format!("Failed to seed agent {}", entry.name))?;
            report.inserted.push(entry.name.to_string());
        }
        tx.commit().context("Failed to commit seed")?;

        report.total = existing.len() + report.inserted.len();
        Ok(report)
    }

    fn query_agents(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Agent>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .context("Failed to prepare agent query")?;
        let rows = stmt
            .query_map(params, AgentRow::from_row)
            .context("Failed to query agents")?;
        let mut agents = Vec::new();
        for row in rows {
            let r = row.context("Failed to read agent row")?;
            agents.push(r.into_agent()?);
        }
        Ok(agents)
    }

    // ── Tasks ─────────────────────────────────────────────────────────

    /// Create a task and its assignee rows in one transaction. The task starts
    /// in `assigned` when it has assignees, otherwise in `inbox`.
    pub fn create_task(&self, task: &NewTask) -> Result<(TaskWithAssignees, Activity)> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        for agent_id in &task.assignee_ids {
            if self.get_agent(*agent_id)?.is_none() {
                return Err(MissionError::AgentNotFound { id: *agent_id }.into());
            }
        }

        let status = if task.assignee_ids.is_empty() {
            TaskStatus::Inbox
        } else {
            TaskStatus::Assigned
        };
        let tags = serde_json::to_string(&task.tags).context("Failed to encode tags")?;
        let now = now_ms();
        self.conn
            .execute(
                "INSERT INTO tasks (title, description, status, priority, tags, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    task.title,
                    task.description,
                    status.as_str(),
                    task.priority.as_str(),
                    tags,
                    now,
                ],
            )
            .context("Failed to insert task")?;
        let task_id = self.conn.last_insert_rowid();

        for agent_id in &task.assignee_ids {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO task_assignees (task_id, agent_id) VALUES (?1, ?2)",
                    params![task_id, agent_id],
                )
                .context("Failed to insert task assignee")?;
        }

        let activity = self.log_activity(&NewActivity {
            activity_type: ActivityType::TaskCreated,
            agent_id: None,
            task_id: Some(task_id),
            title: "New task created".to_string(),
            description: None,
            message: format!("Task \"{}\" was created", task.title),
            metadata: Some(serde_json::json!({ "task_id": task_id })),
        })?;

        let created = self
            .get_task_with_assignees(task_id)?
            .context("Task not found after insert")?;
        tx.commit().context("Failed to commit task insert")?;
        Ok((created, activity))
    }

    /// All tasks, newest first.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        self.query_tasks(
            &format!("SELECT {} FROM tasks ORDER BY id DESC", TASK_COLUMNS),
            params![],
        )
    }

    pub fn tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        self.query_tasks(
            &format!(
                "SELECT {} FROM tasks WHERE status = ?1 ORDER BY id DESC",
                TASK_COLUMNS
            ),
            params![status.as_str()],
        )
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
                params![id],
                TaskRow::from_row,
            )
            .optional()
            .context("Failed to query task")?;
        row.map(TaskRow::into_task).transpose()
    }

    pub fn get_task_with_assignees(&self, id: i64) -> Result<Option<TaskWithAssignees>> {
        let Some(task) = self.get_task(id)? else {
            return Ok(None);
        };
        let assignees = self.query_agents(
            &format!(
                "SELECT {} FROM agents WHERE id IN (SELECT agent_id FROM task_assignees WHERE task_id = ?1) ORDER BY id",
                AGENT_COLUMNS
            ),
            params![id],
        )?;
        Ok(Some(TaskWithAssignees { task, assignees }))
    }

    /// Every task with its assignees resolved, newest first.
    pub fn list_tasks_with_assignees(&self) -> Result<Vec<TaskWithAssignees>> {
        let tasks = self.list_tasks()?;
        let agents: HashMap<i64, Agent> = self
            .list_agents()?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();

        let mut stmt = self
            .conn
            .prepare("SELECT task_id, agent_id FROM task_assignees ORDER BY agent_id")
            .context("Failed to prepare assignee query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TaskAssignee {
                    task_id: row.get(0)?,
                    agent_id: row.get(1)?,
                })
            })
            .context("Failed to query assignees")?;
        let mut by_task: HashMap<i64, Vec<Agent>> = HashMap::new();
        for row in rows {
            let link = row.context("Failed to read assignee row")?;
            if let Some(agent) = agents.get(&link.agent_id) {
                by_task.entry(link.task_id).or_default().push(agent.clone());
            }
        }

        Ok(tasks
            .into_iter()
            .map(|task| {
                let assignees = by_task.remove(&task.id).unwrap_or_default();
                TaskWithAssignees { task, assignees }
            })
            .collect())
    }

    pub fn update_task(&self, id: i64, patch: &TaskPatch) -> Result<Task> {
        let current = self
            .get_task(id)?
            .ok_or(MissionError::TaskNotFound { id })?;
        let title = patch.title.clone().unwrap_or(current.title);
        let description = patch.description.clone().or(current.description);
        let priority = patch.priority.unwrap_or(current.priority);
        let tags = patch.tags.clone().unwrap_or(current.tags);
        let tags = serde_json::to_string(&tags).context("Failed to encode tags")?;

        self.conn
            .execute(
                "UPDATE tasks SET title = ?1, description = ?2, priority = ?3, tags = ?4, updated_at = ?5 WHERE id = ?6",
                params![title, description, priority.as_str(), tags, now_ms(), id],
            )
            .context("Failed to update task")?;
        self.get_task(id)?.context("Task not found after update")
    }

    /// Move a task to a new status and log the transition. `agent_id` is set
    /// when the change was reported by an agent rather than the dashboard.
    pub fn update_task_status(
        &self,
        id: i64,
        status: TaskStatus,
        agent_id: Option<i64>,
    ) -> Result<TaskStatusChange> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let before = self
            .get_task(id)?
            .ok_or(MissionError::TaskNotFound { id })?;

        self.conn
            .execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now_ms(), id],
            )
            .context("Failed to update task status")?;

        let activity = self.log_activity(&NewActivity {
            activity_type: ActivityType::StatusChange,
            agent_id,
            task_id: Some(id),
            title: format!("Task moved to {}", status),
            description: None,
            message: format!("\"{}\" status changed to {}", before.title, status),
            metadata: Some(serde_json::json!({
                "previous_status": before.status,
                "new_status": status,
            })),
        })?;
        let task = self
            .get_task(id)?
            .context("Task not found after status update")?;
        tx.commit().context("Failed to commit task status update")?;

        Ok(TaskStatusChange {
            task,
            previous: before.status,
            activity,
        })
    }

    /// Assign an agent to a task. Returns `None` when the agent was already
    /// assigned, otherwise the `agent_assigned` activity that was logged.
    pub fn assign_agent(&self, task_id: i64, agent_id: i64) -> Result<Option<Activity>> {
        let task = self
            .get_task(task_id)?
            .ok_or(MissionError::TaskNotFound { id: task_id })?;
        let agent = self
            .get_agent(agent_id)?
            .ok_or(MissionError::AgentNotFound { id: agent_id })?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO task_assignees (task_id, agent_id) VALUES (?1, ?2)",
                params![task_id, agent_id],
            )
            .context("Failed to insert task assignee")?;
        if inserted == 0 {
            return Ok(None);
        }

        let activity = self.log_activity(&NewActivity {
            activity_type: ActivityType::AgentAssigned,
            agent_id: Some(agent_id),
            task_id: Some(task_id),
            title: format!("{} assigned to task", agent.name),
            description: None,
            message: format!("{} was assigned to \"{}\"", agent.name, task.title),
            metadata: None,
        })?;
        tx.commit().context("Failed to commit assignment")?;
        Ok(Some(activity))
    }

    pub fn unassign_agent(&self, task_id: i64, agent_id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM task_assignees WHERE task_id = ?1 AND agent_id = ?2",
                params![task_id, agent_id],
            )
            .context("Failed to remove task assignee")?;
        Ok(removed > 0)
    }

    pub fn delete_task(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .context("Failed to delete task")?;
        Ok(deleted > 0)
    }

    fn query_tasks(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .context("Failed to prepare task query")?;
        let rows = stmt
            .query_map(params, TaskRow::from_row)
            .context("Failed to query tasks")?;
        let mut tasks = Vec::new();
        for row in rows {
            let r = row.context("Failed to read task row")?;
            tasks.push(r.into_task()?);
        }
        Ok(tasks)
    }

    // ── Activities ────────────────────────────────────────────────────

    /// Append an entry to the activity log.
    pub fn log_activity(&self, activity: &NewActivity) -> Result<Activity> {
        let metadata = activity
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode activity metadata")?;
        self.conn
            .execute(
                "INSERT INTO activities (type, agent_id, task_id, title, description, message, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    activity.activity_type.as_str(),
                    activity.agent_id,
                    activity.task_id,
                    activity.title,
                    activity.description,
                    activity.message,
                    metadata,
                    now_ms(),
                ],
            )
            .context("Failed to insert activity")?;
        let id = self.conn.last_insert_rowid();
        self.get_activity(id)?
            .context("Activity not found after insert")
    }

    pub fn get_activity(&self, id: i64) -> Result<Option<Activity>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM activities WHERE id = ?1", ACTIVITY_COLUMNS),
                params![id],
                ActivityRow::from_row,
            )
            .optional()
            .context("Failed to query activity")?;
        row.map(ActivityRow::into_activity).transpose()
    }

    /// Latest activities, newest first, each joined with its agent and task.
    pub fn recent_activities(&self, limit: usize) -> Result<Vec<ActivityWithRelations>> {
        let activities = self.query_activities(
            &format!(
                "SELECT {} FROM activities ORDER BY id DESC LIMIT ?1",
                ACTIVITY_COLUMNS
            ),
            params![limit as i64],
        )?;
        activities
            .into_iter()
            .map(|a| self.enrich_activity(a))
            .collect()
    }

    pub fn enrich_activity(&self, activity: Activity) -> Result<ActivityWithRelations> {
        let agent = match activity.agent_id {
            Some(id) => self.get_agent(id)?,
            None => None,
        };
        let task = match activity.task_id {
            Some(id) => self.get_task(id)?,
            None => None,
        };
        Ok(ActivityWithRelations {
            activity,
            agent,
            task,
        })
    }

    pub fn activities_by_agent(&self, agent_id: i64, limit: usize) -> Result<Vec<Activity>> {
        self.query_activities(
            &format!(
                "SELECT {} FROM activities WHERE agent_id = ?1 ORDER BY id DESC LIMIT ?2",
                ACTIVITY_COLUMNS
            ),
            params![agent_id, limit as i64],
        )
    }

    pub fn activities_by_task(&self, task_id: i64, limit: usize) -> Result<Vec<Activity>> {
        self.query_activities(
            &format!(
                "SELECT {} FROM activities WHERE task_id = ?1 ORDER BY id DESC LIMIT ?2",
                ACTIVITY_COLUMNS
            ),
            params![task_id, limit as i64],
        )
    }

    fn query_activities(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Activity>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .context("Failed to prepare activity query")?;
        let rows = stmt
            .query_map(params, ActivityRow::from_row)
            .context("Failed to query activities")?;
        let mut activities = Vec::new();
        for row in rows {
            let r = row.context("Failed to read activity row")?;
            activities.push(r.into_activity()?);
        }
        Ok(activities)
    }

    // ── Comments ──────────────────────────────────────────────────────

    pub fn add_comment(
        &self,
        task_id: i64,
        agent_id: Option<i64>,
        content: &str,
    ) -> Result<(Comment, Activity)> {
        let task = self
            .get_task(task_id)?
            .ok_or(MissionError::TaskNotFound { id: task_id })?;
        let author = match agent_id {
            Some(id) => Some(
                self.get_agent(id)?
                    .ok_or(MissionError::AgentNotFound { id })?,
            ),
            None => None,
        };

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        self.conn
            .execute(
                "INSERT INTO comments (task_id, agent_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![task_id, agent_id, content, now_ms()],
            )
            .context("Failed to insert comment")?;
        let id = self.conn.last_insert_rowid();
        let comment = self
            .get_comment(id)?
            .context("Comment not found after insert")?;

        let who = author
            .as_ref()
            .map(|a| a.name.as_str())
            .unwrap_or("Someone");
        let activity = self.log_activity(&NewActivity {
            activity_type: ActivityType::CommentAdded,
            agent_id,
            task_id: Some(task_id),
            title: format!("{} commented", who),
            description: Some(content.to_string()),
            message: format!("{} commented on \"{}\"", who, task.title),
            metadata: Some(serde_json::json!({ "comment_id": id })),
        })?;
        tx.commit().context("Failed to commit comment")?;
        Ok((comment, activity))
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<Comment>> {
        self.conn
            .query_row(
                "SELECT id, task_id, agent_id, content, created_at FROM comments WHERE id = ?1",
                params![id],
                comment_from_row,
            )
            .optional()
            .context("Failed to query comment")
    }

    /// Comments on a task, oldest first.
    pub fn list_comments(&self, task_id: i64) -> Result<Vec<Comment>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, task_id, agent_id, content, created_at FROM comments WHERE task_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare list_comments")?;
        let rows = stmt
            .query_map(params![task_id], comment_from_row)
            .context("Failed to query comments")?;
        let mut comments = Vec::new();
        for row in rows {
            comments.push(row.context("Failed to read comment row")?);
        }
        Ok(comments)
    }

    // ── Aggregates ────────────────────────────────────────────────────

    pub fn get_board(&self) -> Result<BoardView> {
        Ok(BoardView::from_tasks(self.list_tasks_with_assignees()?))
    }

    pub fn get_stats(&self) -> Result<DashboardStats> {
        Ok(DashboardStats::compute(
            &self.list_agents()?,
            &self.list_tasks()?,
        ))
    }

    pub fn squad(&self) -> Result<Vec<Agent>> {
        Ok(squad_order(self.list_agents()?))
    }
}

// ── Row helpers ──────────────────────────────────────────────────────

struct AgentRow {
    id: i64,
    name: String,
    role: String,
    anime: Option<String>,
    emoji: Option<String>,
    avatar_url: Option<String>,
    level: String,
    status: String,
    current_task: Option<String>,
    color: Option<String>,
    session_key: Option<String>,
    last_heartbeat: Option<i64>,
    created_at: i64,
}

impl AgentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            role: row.get(2)?,
            anime: row.get(3)?,
            emoji: row.get(4)?,
            avatar_url: row.get(5)?,
            level: row.get(6)?,
            status: row.get(7)?,
            current_task: row.get(8)?,
            color: row.get(9)?,
            session_key: row.get(10)?,
            last_heartbeat: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    fn into_agent(self) -> Result<Agent> {
        Ok(Agent {
            id: self.id,
            name: self.name,
            role: self.role,
            anime: self.anime,
            emoji: self.emoji,
            avatar_url: self.avatar_url,
            level: AgentLevel::from_str(&self.level).map_err(|e| anyhow::anyhow!(e))?,
            status: AgentStatus::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?,
            current_task: self.current_task,
            color: self.color,
            session_key: self.session_key,
            last_heartbeat: self.last_heartbeat,
            created_at: self.created_at,
        })
    }
}

struct TaskRow {
    id: i64,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    tags: String,
    created_at: i64,
    updated_at: i64,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            status: row.get(3)?,
            priority: row.get(4)?,
            tags: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        Ok(Task {
            id: self.id,
            title: self.title,
            description: self.description,
            status: TaskStatus::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?,
            priority: Priority::from_str(&self.priority).map_err(|e| anyhow::anyhow!(e))?,
            tags: serde_json::from_str(&self.tags).context("Failed to parse tags")?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct ActivityRow {
    id: i64,
    activity_type: String,
    agent_id: Option<i64>,
    task_id: Option<i64>,
    title: String,
    description: Option<String>,
    message: String,
    metadata: Option<String>,
    created_at: i64,
}

impl ActivityRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            activity_type: row.get(1)?,
            agent_id: row.get(2)?,
            task_id: row.get(3)?,
            title: row.get(4)?,
            description: row.get(5)?,
            message: row.get(6)?,
            metadata: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_activity(self) -> Result<Activity> {
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .context("Failed to parse activity metadata")?;
        Ok(Activity {
            id: self.id,
            activity_type: ActivityType::parse(&self.activity_type),
            agent_id: self.agent_id,
            task_id: self.task_id,
            title: self.title,
            description: self.description,
            message: self.message,
            metadata,
            created_at: self.created_at,
        })
    }
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        task_id: row.get(1)?,
        agent_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}
