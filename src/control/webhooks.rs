//! Agent-facing webhook endpoints.
//!
//! Agents report in from arbitrary origins, so every response here carries
//! open CORS headers regardless of the server's dev-mode CORS layer. Bodies
//! are parsed by hand so malformed JSON gets a JSON error, not axum's plain
//! text rejection.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};

use super::api::{SharedState, broadcast_activity};
use super::models::{AgentStatus, TaskStatus};
use super::ws::{WsMessage, broadcast_message};
use crate::errors::MissionError;

const CORS_HEADERS: [(header::HeaderName, &str); 3] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
    (
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        "Content-Type, Authorization",
    ),
];

pub fn webhook_router() -> Router<SharedState> {
    Router::new()
        .route("/agent/heartbeat", post(heartbeat).options(preflight))
        .route("/agent/task-update", post(task_update).options(preflight))
        .route("/agents", get(list_agents).options(preflight))
}

fn cors_json(status: StatusCode, body: Value) -> Response {
    (status, CORS_HEADERS, Json(body)).into_response()
}

fn cors_error(status: StatusCode, message: impl Into<String>) -> Response {
    cors_json(status, json!({ "error": message.into() }))
}

fn internal(err: anyhow::Error) -> Response {
    tracing::error!(error = %err, "webhook request failed");
    cors_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

async fn preflight() -> Response {
    (StatusCode::NO_CONTENT, CORS_HEADERS).into_response()
}

/// Non-empty string field, or `None`.
fn str_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Present and not `null`, `false`, `0` or `""`.
fn is_truthy(body: &Value, key: &str) -> bool {
    match body.get(key) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(_) => true,
    }
}

fn parse_body(bytes: &Bytes) -> Result<Value, Response> {
    serde_json::from_slice(bytes)
        .map_err(|_| cors_error(StatusCode::BAD_REQUEST, "Invalid JSON body"))
}

/// `taskId` may arrive as a number or a numeric string.
fn parse_task_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

/// `POST /agent/heartbeat` with `{sessionKey, status?, currentTask?}`.
async fn heartbeat(State(state): State<SharedState>, body: Bytes) -> Response {
    let body = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(session_key) = str_field(&body, "sessionKey").map(str::to_string) else {
        return cors_error(StatusCode::BAD_REQUEST, "sessionKey is required");
    };

    // Unparseable status is only reported once the agent is known.
    let status = if is_truthy(&body, "status") {
        match body["status"].as_str().map(str::parse::<AgentStatus>) {
            Some(Ok(s)) => Some(Ok(s)),
            _ => Some(Err(MissionError::InvalidStatus {
                value: body["status"].to_string(),
                allowed: AgentStatus::allowed(),
            })),
        }
    } else {
        None
    };
    let current_task = str_field(&body, "currentTask").map(str::to_string);

    let result = state
        .db
        .call(move |db| {
            let agent = db
                .agent_by_session_key(&session_key)?
                .ok_or(MissionError::SessionKeyNotFound)?;
            match status.transpose()? {
                Some(status) => {
                    let change =
                        db.update_agent_status(agent.id, status, current_task.as_deref())?;
                    let activity = db.enrich_activity(change.activity)?;
                    Ok((change.agent, Some(activity)))
                }
                None => Ok((db.heartbeat(agent.id)?, None)),
            }
        })
        .await;

    match result {
        Ok((agent, activity)) => {
            tracing::debug!(agent = %agent.name, status = %agent.status, "heartbeat");
            broadcast_message(
                &state.ws_tx,
                &WsMessage::AgentUpdated {
                    agent: agent.clone(),
                },
            );
            if let Some(activity) = activity {
                broadcast_activity(&state, activity);
            }
            cors_json(
                StatusCode::OK,
                json!({ "ok": true, "agent": agent.name, "status": agent.status }),
            )
        }
        Err(e) => match MissionError::find(&e) {
            Some(err @ MissionError::SessionKeyNotFound) => {
                cors_error(StatusCode::NOT_FOUND, err.to_string())
            }
            Some(err @ MissionError::InvalidStatus { .. }) => {
                cors_error(StatusCode::BAD_REQUEST, err.to_string())
            }
            _ => internal(e),
        },
    }
}

/// `POST /agent/task-update` with `{sessionKey, taskId, status}`.
async fn task_update(State(state): State<SharedState>, body: Bytes) -> Response {
    let body = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(session_key) = str_field(&body, "sessionKey").map(str::to_string) else {
        return cors_error(StatusCode::BAD_REQUEST, "sessionKey is required");
    };
    let has_task_id = match body.get("taskId") {
        Some(Value::Number(_)) => true,
        Some(Value::String(s)) => !s.is_empty(),
        _ => false,
    };
    if !has_task_id {
        return cors_error(StatusCode::BAD_REQUEST, "taskId is required");
    }
    let Some(raw_status) = str_field(&body, "status") else {
        return cors_error(StatusCode::BAD_REQUEST, "status is required");
    };
    let status: TaskStatus = match raw_status.parse() {
        Ok(s) => s,
        Err(e) => return cors_error(StatusCode::BAD_REQUEST, e),
    };
    let raw_task_id = body["taskId"].clone();

    let agent = match state
        .db
        .call(move |db| db.agent_by_session_key(&session_key))
        .await
    {
        Ok(Some(agent)) => agent,
        Ok(None) => {
            return cors_error(
                StatusCode::NOT_FOUND,
                MissionError::SessionKeyNotFound.to_string(),
            );
        }
        Err(e) => return internal(e),
    };

    let Some(task_id) = parse_task_id(&raw_task_id) else {
        return cors_error(StatusCode::BAD_REQUEST, "Task not found");
    };

    let agent_id = agent.id;
    let result = state
        .db
        .call(move |db| {
            let change = db.update_task_status(task_id, status, Some(agent_id))?;
            let activity = db.enrich_activity(change.activity)?;
            Ok((change.task, change.previous, activity))
        })
        .await;

    match result {
        Ok((task, previous, activity)) => {
            tracing::debug!(agent = %agent.name, task_id, from = %previous, to = %status, "task update");
            broadcast_message(
                &state.ws_tx,
                &WsMessage::TaskMoved {
                    task_id: task.id,
                    from_status: previous,
                    to_status: task.status,
                },
            );
            broadcast_activity(&state, activity);
            cors_json(
                StatusCode::OK,
                json!({
                    "ok": true,
                    "agent": agent.name,
                    "taskId": raw_task_id,
                    "status": status,
                }),
            )
        }
        Err(e) => {
            let message = match MissionError::find(&e) {
                Some(err) => err.to_string(),
                None => e.to_string(),
            };
            tracing::warn!(task_id, error = %message, "task update rejected");
            cors_error(StatusCode::BAD_REQUEST, message)
        }
    }
}

/// `GET /agents` for agents checking who else is on the squad.
async fn list_agents(State(state): State<SharedState>) -> Response {
    match state.db.call(|db| db.list_agents()).await {
        Ok(agents) => cors_json(StatusCode::OK, json!({ "agents": agents })),
        Err(e) => internal(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::api::test_state;
    use crate::control::models::{AgentLevel, NewAgent, NewTask};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn body_json(body: Body) -> Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn app_with_agent() -> (Router, SharedState) {
        let state = test_state();
        {
            let db = state.db.lock_sync().unwrap();
            db.create_agent(&NewAgent {
                name: "Reigen".into(),
                role: "Developer".into(),
                anime: None,
                emoji: None,
                avatar_url: None,
                level: AgentLevel::Specialist,
                color: None,
                session_key: Some("reigen-session".into()),
            })
            .unwrap();
        }
        (webhook_router().with_state(state.clone()), state)
    }

    #[tokio::test]
    async fn test_heartbeat_invalid_json() {
        let (app, _) = app_with_agent();
        let resp = app
            .oneshot(post_json("/agent/heartbeat", "{not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["error"], "Invalid JSON body");
    }

    #[tokio::test]
    async fn test_heartbeat_requires_session_key() {
        let (app, _) = app_with_agent();
        let resp = app
            .oneshot(post_json("/agent/heartbeat", r#"{"status":"idle"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["error"], "sessionKey is required");
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_session() {
        let (app, _) = app_with_agent();
        let resp = app
            .oneshot(post_json(
                "/agent/heartbeat",
                r#"{"sessionKey":"nobody-session"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["error"], "Agent not found for this session key");
    }

    #[tokio::test]
    async fn test_heartbeat_invalid_status() {
        let (app, _) = app_with_agent();
        let resp = app
            .oneshot(post_json(
                "/agent/heartbeat",
                r#"{"sessionKey":"reigen-session","status":"sleeping"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp.into_body()).await;
        assert_eq!(
            json["error"],
            "Invalid status. Must be one of: idle, working, done, blocked"
        );
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_session_wins_over_bad_status() {
        let (app, _) = app_with_agent();
        let resp = app
            .oneshot(post_json(
                "/agent/heartbeat",
                r#"{"sessionKey":"nobody","status":"sleeping"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["error"], "Agent not found for this session key");
    }

    #[tokio::test]
    async fn test_heartbeat_empty_status_is_plain_heartbeat() {
        let (app, state) = app_with_agent();
        let resp = app
            .oneshot(post_json(
                "/agent/heartbeat",
                r#"{"sessionKey":"reigen-session","status":""}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["status"], "idle");

        let db = state.db.lock_sync().unwrap();
        let agent = db.agent_by_session_key("reigen-session").unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Idle);
        assert!(db.recent_activities(10).unwrap().iter().all(|a| {
            a.activity.activity_type.as_str() != "status_change"
        }));
    }

    #[tokio::test]
    async fn test_heartbeat_with_status_updates_agent() {
        let (app, state) = app_with_agent();
        let mut rx = state.ws_tx.subscribe();
        let resp = app
            .oneshot(post_json(
                "/agent/heartbeat",
                r#"{"sessionKey":"reigen-session","status":"working","currentTask":"Fix login"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["agent"], "Reigen");
        assert_eq!(json["status"], "working");

        let db = state.db.lock_sync().unwrap();
        let agent = db.agent_by_session_key("reigen-session").unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Working);
        assert_eq!(agent.current_task.as_deref(), Some("Fix login"));
        drop(db);

        let first: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["type"], "AgentUpdated");
        let second: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(second["type"], "ActivityLogged");
        assert_eq!(second["data"]["activity"]["type"], "status_change");
    }

    #[tokio::test]
    async fn test_heartbeat_without_status_keeps_status() {
        let (app, state) = app_with_agent();
        let resp = app
            .oneshot(post_json(
                "/agent/heartbeat",
                r#"{"sessionKey":"reigen-session"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["status"], "idle");

        let db = state.db.lock_sync().unwrap();
        let agent = db.agent_by_session_key("reigen-session").unwrap().unwrap();
        assert!(agent.last_heartbeat.is_some());
        assert!(db.recent_activities(10).unwrap().iter().all(|a| {
            a.activity.activity_type.as_str() != "status_change"
        }));
    }

    #[tokio::test]
    async fn test_task_update_moves_task() {
        let (app, state) = app_with_agent();
        let task_id = {
            let db = state.db.lock_sync().unwrap();
            let (task, _) = db
                .create_task(&NewTask {
                    title: "Ship it".into(),
                    ..Default::default()
                })
                .unwrap();
            task.task.id
        };
        let body = format!(
            r#"{{"sessionKey":"reigen-session","taskId":"{}","status":"review"}}"#,
            task_id
        );
        let resp = app
            .oneshot(post_json("/agent/task-update", &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["agent"], "Reigen");
        assert_eq!(json["taskId"], task_id.to_string());
        assert_eq!(json["status"], "review");

        let db = state.db.lock_sync().unwrap();
        assert_eq!(
            db.get_task(task_id).unwrap().unwrap().status,
            TaskStatus::Review
        );
    }

    async fn task_update_error(app: &Router, body: &str) -> (StatusCode, Value) {
        let resp = app
            .clone()
            .oneshot(post_json("/agent/task-update", body))
            .await
            .unwrap();
        let status = resp.status();
        (status, body_json(resp.into_body()).await)
    }

    #[tokio::test]
    async fn test_task_update_validation_order() {
        let (app, _) = app_with_agent();

        let (status, json) = task_update_error(&app, r#"{"taskId":1,"status":"done"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "sessionKey is required");

        let (status, json) =
            task_update_error(&app, r#"{"sessionKey":"reigen-session","status":"done"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "taskId is required");

        let (status, json) = task_update_error(
            &app,
            r#"{"sessionKey":"reigen-session","taskId":"","status":"done"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "taskId is required");

        let (status, json) =
            task_update_error(&app, r#"{"sessionKey":"reigen-session","taskId":1}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "status is required");

        // Bad status is reported before the session key is looked up.
        let (status, json) = task_update_error(
            &app,
            r#"{"sessionKey":"nobody","taskId":1,"status":"finished"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().starts_with("Invalid status"));

        let (status, _) = task_update_error(
            &app,
            r#"{"sessionKey":"nobody","taskId":1,"status":"done"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) = task_update_error(
            &app,
            r#"{"sessionKey":"reigen-session","taskId":999,"status":"done"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Task not found");
    }

    #[tokio::test]
    async fn test_list_agents() {
        let (app, _) = app_with_agent();
        let req = Request::builder()
            .uri("/agents")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["agents"].as_array().unwrap().len(), 1);
        assert_eq!(json["agents"][0]["name"], "Reigen");
    }

    #[tokio::test]
    async fn test_preflight() {
        let (app, _) = app_with_agent();
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/agent/heartbeat")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            resp.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, OPTIONS"
        );
    }
}
