use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use serde::Deserialize;
use tokio::sync::broadcast;

use super::db::{DbHandle, now_ms};
use super::gateway::{ChatError, ChatRelay};
use super::health::{self, HealthThresholds};
use super::models::*;
use super::roster::ROSTER;
use super::sprites::{self, SpriteError};
use super::ws::{WsMessage, broadcast_message};
use crate::errors::MissionError;
use crate::world;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub ws_tx: broadcast::Sender<String>,
    pub chat: ChatRelay,
    pub health: HealthThresholds,
    /// Activity-feed page size when the client gives no `limit`.
    pub feed_limit: usize,
    pub sprites_dir: PathBuf,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct StatusFilter {
    pub status: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize, Default)]
pub struct WorldQuery {
    pub seed: Option<u64>,
}

/// Viewport click; camera fields default to an unpanned 800×600 view.
#[derive(Deserialize)]
pub struct PickQuery {
    pub seed: Option<u64>,
    pub x: f64,
    pub y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    #[serde(default)]
    pub offset_x: f64,
    #[serde(default)]
    pub offset_y: f64,
    pub zoom: Option<f64>,
    /// Wheel delta applied after `zoom`.
    pub wheel: Option<f64>,
}

#[derive(Deserialize, Default)]
pub struct FrameQuery {
    pub status: Option<String>,
    pub animation: Option<String>,
    pub elapsed_ms: Option<u64>,
}

#[derive(Deserialize)]
pub struct AgentStatusRequest {
    pub status: String,
    #[serde(default, alias = "currentTask")]
    pub current_task: Option<String>,
}

#[derive(Deserialize)]
pub struct TaskStatusRequest {
    pub status: String,
    #[serde(default, alias = "agentId")]
    pub agent_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    #[serde(alias = "agentId")]
    pub agent_id: i64,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    #[serde(default, alias = "agentId")]
    pub agent_id: Option<i64>,
    pub content: String,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
    /// `{"error", "details"}` with an explicit status, used for upstream
    /// gateway failures.
    Detailed {
        status: StatusCode,
        error: String,
        details: String,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({"error": msg})),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({"error": msg}))
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({"error": msg}),
            ),
            ApiError::Detailed {
                status,
                error,
                details,
            } => (status, serde_json::json!({"error": error, "details": details})),
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match MissionError::find(&err) {
            Some(
                e @ (MissionError::AgentNotFound { .. }
                | MissionError::TaskNotFound { .. }
                | MissionError::SessionKeyNotFound),
            ) => ApiError::NotFound(e.to_string()),
            Some(e @ MissionError::InvalidStatus { .. }) => ApiError::BadRequest(e.to_string()),
            _ => {
                tracing::error!(error = %format!("{:#}", err), "request failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::MissingFields => ApiError::BadRequest(err.to_string()),
            ChatError::NotConfigured => ApiError::Internal(err.to_string()),
            ChatError::UnknownAgent(_) => ApiError::NotFound(err.to_string()),
            ChatError::Upstream { status, ref details } => {
                tracing::warn!(status, details = %details, "gateway rejected chat message");
                ApiError::Detailed {
                    status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                    error: err.to_string(),
                    details: details.clone(),
                }
            }
            ChatError::Transport(ref details) => {
                tracing::error!(details = %details, "chat relay failed");
                ApiError::Detailed {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    error: err.to_string(),
                    details: details.clone(),
                }
            }
        }
    }
}

impl From<SpriteError> for ApiError {
    fn from(err: SpriteError) -> Self {
        match err {
            SpriteError::InvalidName(_) | SpriteError::UnknownAnimation(_) => {
                ApiError::BadRequest(err.to_string())
            }
            SpriteError::NotFound(_) => ApiError::NotFound(err.to_string()),
            SpriteError::Parse { .. } | SpriteError::Io { .. } => {
                tracing::error!(error = %err, "failed to load sprite metadata");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/agents",
            get(list_agents).post(create_agent).delete(clear_agents),
        )
        .route("/api/agents/{id}", get(get_agent).delete(delete_agent))
        .route("/api/agents/{id}/status", patch(update_agent_status))
        .route("/api/agents/{id}/heartbeat", post(agent_heartbeat))
        .route("/api/agents/{id}/activities", get(agent_activities))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/{id}",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/api/tasks/{id}/status", patch(update_task_status))
        .route("/api/tasks/{id}/assignees", post(assign_agent))
        .route(
            "/api/tasks/{id}/assignees/{agent_id}",
            delete(unassign_agent),
        )
        .route(
            "/api/tasks/{id}/comments",
            get(list_comments).post(add_comment),
        )
        .route("/api/tasks/{id}/activities", get(task_activities))
        .route("/api/activities", get(list_activities))
        .route("/api/board", get(get_board))
        .route("/api/stats", get(get_stats))
        .route("/api/squad", get(get_squad))
        .route("/api/health-monitor", get(health_monitor))
        .route("/api/seed", post(seed_roster))
        .route("/api/world", get(get_world))
        .route("/api/world/pick", get(pick_tile))
        .route("/api/sprites/{name}", get(get_sprite))
        .route("/api/sprites/{name}/frame", get(get_sprite_frame))
        .route("/api/agent-chat", get(chat_status).post(agent_chat))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Push an enriched activity onto the live feed.
pub(crate) fn broadcast_activity(state: &AppState, activity: ActivityWithRelations) {
    broadcast_message(&state.ws_tx, &WsMessage::ActivityLogged { activity });
}

/// Parse an optional enum-valued query parameter.
fn parse_param<T: FromStr<Err = String>>(value: Option<String>) -> Result<Option<T>, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<T>().map_err(ApiError::BadRequest))
        .transpose()
}

// ── Agents ────────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_agents(
    State(state): State<SharedState>,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<Agent>>, ApiError> {
    let status = parse_param::<AgentStatus>(filter.status)?;
    let agents = state
        .db
        .call(move |db| match status {
            Some(status) => db.agents_by_status(status),
            None => db.list_agents(),
        })
        .await?;
    Ok(Json(agents))
}

async fn create_agent(
    State(state): State<SharedState>,
    Json(req): Json<NewAgent>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Agent name is required".into()));
    }
    let (agent, activity) = state
        .db
        .call(move |db| {
            let (agent, activity) = db.create_agent(&req)?;
            Ok((agent, db.enrich_activity(activity)?))
        })
        .await?;
    tracing::info!(agent = %agent.name, id = agent.id, "agent created");
    broadcast_message(
        &state.ws_tx,
        &WsMessage::AgentCreated {
            agent: agent.clone(),
        },
    );
    broadcast_activity(&state, activity);
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn get_agent(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Agent>, ApiError> {
    let agent = state.db.call(move |db| db.get_agent(id)).await?;
    agent
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(MissionError::AgentNotFound { id }.to_string()))
}

async fn delete_agent(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_agent(id)).await?;
    match deleted {
        true => {
            broadcast_message(&state.ws_tx, &WsMessage::AgentDeleted { agent_id: id });
            Ok(StatusCode::NO_CONTENT)
        }
        false => Err(ApiError::NotFound(
            MissionError::AgentNotFound { id }.to_string(),
        )),
    }
}

/// Dev helper: wipe the squad.
async fn clear_agents(
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.db.call(|db| db.clear_agents()).await?;
    tracing::warn!(deleted, "all agents cleared");
    broadcast_message(&state.ws_tx, &WsMessage::AgentsCleared { deleted });
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

async fn update_agent_status(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<AgentStatusRequest>,
) -> Result<Json<Agent>, ApiError> {
    let status: AgentStatus = req.status.parse().map_err(ApiError::BadRequest)?;
    let current_task = req.current_task.filter(|t| !t.is_empty());
    let (agent, activity) = state
        .db
        .call(move |db| {
            let change = db.update_agent_status(id, status, current_task.as_deref())?;
            Ok((change.agent, db.enrich_activity(change.activity)?))
        })
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::AgentUpdated {
            agent: agent.clone(),
        },
    );
    broadcast_activity(&state, activity);
    Ok(Json(agent))
}

async fn agent_heartbeat(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Agent>, ApiError> {
    let agent = state.db.call(move |db| db.heartbeat(id)).await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::AgentUpdated {
            agent: agent.clone(),
        },
    );
    Ok(Json(agent))
}

async fn agent_activities(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<Activity>>, ApiError> {
    let limit = q.limit.unwrap_or(state.feed_limit);
    let activities = state
        .db
        .call(move |db| {
            db.get_agent(id)?
                .ok_or(MissionError::AgentNotFound { id })?;
            db.activities_by_agent(id, limit)
        })
        .await?;
    Ok(Json(activities))
}

// ── Tasks ─────────────────────────────────────────────────────────────

async fn list_tasks(
    State(state): State<SharedState>,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<TaskWithAssignees>>, ApiError> {
    let status = parse_param::<TaskStatus>(filter.status)?;
    let mut tasks = state
        .db
        .call(|db| db.list_tasks_with_assignees())
        .await?;
    if let Some(status) = status {
        tasks.retain(|t| t.task.status == status);
    }
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<SharedState>,
    Json(req): Json<NewTask>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Task title is required".into()));
    }
    let (task, activity) = state
        .db
        .call(move |db| {
            let (task, activity) = db.create_task(&req)?;
            Ok((task, db.enrich_activity(activity)?))
        })
        .await?;
    tracing::info!(task_id = task.task.id, title = %task.task.title, "task created");
    broadcast_message(&state.ws_tx, &WsMessage::TaskCreated { task: task.clone() });
    broadcast_activity(&state, activity);
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<TaskWithAssignees>, ApiError> {
    let task = state
        .db
        .call(move |db| db.get_task_with_assignees(id))
        .await?;
    task.map(Json)
        .ok_or_else(|| ApiError::NotFound(MissionError::TaskNotFound { id }.to_string()))
}

async fn update_task(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>, ApiError> {
    if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::BadRequest("Task title cannot be empty".into()));
    }
    let task = state.db.call(move |db| db.update_task(id, &patch)).await?;
    broadcast_message(&state.ws_tx, &WsMessage::TaskUpdated { task: task.clone() });
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_task(id)).await?;
    match deleted {
        true => {
            broadcast_message(&state.ws_tx, &WsMessage::TaskDeleted { task_id: id });
            Ok(StatusCode::NO_CONTENT)
        }
        false => Err(ApiError::NotFound(
            MissionError::TaskNotFound { id }.to_string(),
        )),
    }
}

/// Drag-and-drop column move from the board.
async fn update_task_status(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<TaskStatusRequest>,
) -> Result<Json<Task>, ApiError> {
    let status: TaskStatus = req.status.parse().map_err(ApiError::BadRequest)?;
    let agent_id = req.agent_id;
    let (change, activity) = state
        .db
        .call(move |db| {
            let change = db.update_task_status(id, status, agent_id)?;
            let activity = db.enrich_activity(change.activity.clone())?;
            Ok((change, activity))
        })
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TaskMoved {
            task_id: id,
            from_status: change.previous,
            to_status: change.task.status,
        },
    );
    broadcast_activity(&state, activity);
    Ok(Json(change.task))
}

async fn assign_agent(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<TaskWithAssignees>, ApiError> {
    let agent_id = req.agent_id;
    let (task, activity) = state
        .db
        .call(move |db| {
            let activity = match db.assign_agent(id, agent_id)? {
                Some(activity) => Some(db.enrich_activity(activity)?),
                None => None,
            };
            let task = db
                .get_task_with_assignees(id)?
                .ok_or(MissionError::TaskNotFound { id })?;
            Ok((task, activity))
        })
        .await?;
    if let Some(activity) = activity {
        broadcast_message(
            &state.ws_tx,
            &WsMessage::TaskAssigned {
                task_id: id,
                agent_id,
            },
        );
        broadcast_activity(&state, activity);
    }
    Ok(Json(task))
}

async fn unassign_agent(
    State(state): State<SharedState>,
    Path((id, agent_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .db
        .call(move |db| {
            if db.unassign_agent(id, agent_id)? {
                db.get_task(id)
            } else {
                Ok(None)
            }
        })
        .await?;
    match task {
        Some(task) => {
            broadcast_message(&state.ws_tx, &WsMessage::TaskUpdated { task });
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::NotFound(format!(
            "Agent {} is not assigned to task {}",
            agent_id, id
        ))),
    }
}

async fn list_comments(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    let comments = state
        .db
        .call(move |db| {
            db.get_task(id)?.ok_or(MissionError::TaskNotFound { id })?;
            db.list_comments(id)
        })
        .await?;
    Ok(Json(comments))
}

async fn add_comment(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("Comment content is required".into()));
    }
    let (comment, activity) = state
        .db
        .call(move |db| {
            let (comment, activity) = db.add_comment(id, req.agent_id, &req.content)?;
            Ok((comment, db.enrich_activity(activity)?))
        })
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::CommentAdded {
            comment: comment.clone(),
        },
    );
    broadcast_activity(&state, activity);
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn task_activities(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<Activity>>, ApiError> {
    let limit = q.limit.unwrap_or(state.feed_limit);
    let activities = state
        .db
        .call(move |db| {
            db.get_task(id)?.ok_or(MissionError::TaskNotFound { id })?;
            db.activities_by_task(id, limit)
        })
        .await?;
    Ok(Json(activities))
}

// ── Feed and aggregates ───────────────────────────────────────────────

async fn list_activities(
    State(state): State<SharedState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<ActivityWithRelations>>, ApiError> {
    let limit = q.limit.unwrap_or(state.feed_limit);
    let feed = state
        .db
        .call(move |db| db.recent_activities(limit))
        .await?;
    Ok(Json(feed))
}

async fn get_board(State(state): State<SharedState>) -> Result<Json<BoardView>, ApiError> {
    Ok(Json(state.db.call(|db| db.get_board()).await?))
}

async fn get_stats(State(state): State<SharedState>) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(state.db.call(|db| db.get_stats()).await?))
}

async fn get_squad(State(state): State<SharedState>) -> Result<Json<Vec<Agent>>, ApiError> {
    Ok(Json(state.db.call(|db| db.squad()).await?))
}

async fn health_monitor(
    State(state): State<SharedState>,
) -> Result<Json<health::HealthReport>, ApiError> {
    let agents = state.db.call(|db| db.list_agents()).await?;
    Ok(Json(health::report(agents, now_ms(), &state.health)))
}

/// Insert any roster agents that are missing.
async fn seed_roster(
    State(state): State<SharedState>,
) -> Result<Json<super::db::SeedReport>, ApiError> {
    let (report, created) = state
        .db
        .call(|db| {
            let report = db.seed_agents(ROSTER)?;
            let created: Vec<Agent> = db
                .list_agents()?
                .into_iter()
                .filter(|a| report.inserted.contains(&a.name))
                .collect();
            Ok((report, created))
        })
        .await?;
    tracing::info!(
        inserted = report.inserted.len(),
        skipped = report.skipped.len(),
        "roster seeded"
    );
    for agent in created {
        broadcast_message(&state.ws_tx, &WsMessage::AgentCreated { agent });
    }
    Ok(Json(report))
}

// ── World and sprites ─────────────────────────────────────────────────

async fn get_world(
    State(state): State<SharedState>,
    Query(q): Query<WorldQuery>,
) -> Result<Json<world::Scene>, ApiError> {
    let seed = q.seed.unwrap_or_else(rand::random);
    let agents = state.db.call(|db| db.squad()).await?;
    Ok(Json(world::render(seed, &agents)))
}

async fn pick_tile(Query(q): Query<PickQuery>) -> Json<world::Pick> {
    let defaults = world::Camera::default();
    let mut camera = world::Camera::new(
        q.width.unwrap_or(defaults.viewport_width),
        q.height.unwrap_or(defaults.viewport_height),
    );
    camera.pan(q.offset_x, q.offset_y);
    if let Some(zoom) = q.zoom {
        camera.set_zoom(zoom);
    }
    if let Some(delta) = q.wheel {
        camera.wheel(delta);
    }
    let seed = q.seed.unwrap_or_else(rand::random);
    Json(world::pick(
        seed,
        &camera,
        world::ScreenPoint { x: q.x, y: q.y },
    ))
}

async fn load_sprite(
    state: &AppState,
    name: String,
) -> Result<sprites::SpriteMetadata, ApiError> {
    let dir = state.sprites_dir.clone();
    tokio::task::spawn_blocking(move || sprites::load_metadata(&dir, &name))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

async fn get_sprite(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<sprites::SpriteMetadata>, ApiError> {
    Ok(Json(load_sprite(&state, name).await?))
}

async fn get_sprite_frame(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Query(q): Query<FrameQuery>,
) -> Result<Json<sprites::FrameSelection>, ApiError> {
    let status = parse_param::<AgentStatus>(q.status)?;
    let metadata = load_sprite(&state, name).await?;
    let frame = metadata.select_frame(
        q.animation.as_deref(),
        status,
        q.elapsed_ms.unwrap_or(0),
    )?;
    Ok(Json(frame))
}

// ── Chat overlay ──────────────────────────────────────────────────────

async fn chat_status(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.chat.status())
}

/// Body is parsed by hand so a malformed payload reports like any other
/// relay failure instead of axum's plain-text rejection.
async fn agent_chat(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let body: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ChatError::Transport(e.to_string()))?;
    let field = |key: &str| {
        body.get(key)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let (agent_id, message) = (field("agentId"), field("message"));
    let reply = state.chat.relay(&agent_id, &message).await?;
    Ok(Json(reply))
}

#[cfg(test)]
pub(crate) fn test_state() -> SharedState {
    state_with(
        ChatRelay::new(None, Default::default()),
        std::env::temp_dir().join("mission-control-no-sprites"),
    )
}

#[cfg(test)]
fn state_with(chat: ChatRelay, sprites_dir: PathBuf) -> SharedState {
    let db = super::db::MissionDb::new_in_memory().unwrap();
    let (ws_tx, _) = broadcast::channel(64);
    Arc::new(AppState {
        db: DbHandle::new(db),
        ws_tx,
        chat,
        health: HealthThresholds::default(),
        feed_limit: super::db::DEFAULT_ACTIVITY_LIMIT,
        sprites_dir,
    })
}
