//! Chat relay between the dashboard and the agent-orchestration gateway.
//!
//! The dashboard posts `{agentId, message}`; the relay maps the chat id to a
//! gateway session key, forwards the message, and returns the agent's reply.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::mission_config::GatewaySection;

/// Prefix added to every relayed message so agents can tell dashboard chat
/// apart from their regular inputs.
pub const CHAT_PREFIX: &str = "[Mission Control Chat]";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Missing agentId or message")]
    MissingFields,

    #[error("Gateway not configured")]
    NotConfigured,

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// The gateway answered with a non-success status.
    #[error("Failed to reach agent")]
    Upstream { status: u16, details: String },

    /// The request never completed (connect error, timeout, bad JSON).
    #[error("Internal server error")]
    Transport(String),
}

/// Transport to the gateway's session API.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Send a message to a session and return the gateway's JSON reply.
    async fn send(&self, session_key: &str, message: &str) -> Result<Value, ChatError>;
}

/// `ChatGateway` over HTTP: `POST {url}/api/sessions/send` with a bearer token.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    token: String,
    timeout_seconds: u64,
}

impl HttpGateway {
    pub fn new(base_url: &str, token: &str, timeout_seconds: u64) -> Result<Self> {
        // Give the gateway its full session timeout plus headroom for the
        // round trip before giving up locally.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds + 10))
            .build()
            .context("Failed to build gateway HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout_seconds,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    session_key: &'a str,
    message: &'a str,
    timeout_seconds: u64,
}

#[async_trait]
impl ChatGateway for HttpGateway {
    async fn send(&self, session_key: &str, message: &str) -> Result<Value, ChatError> {
        let url = format!("{}/api/sessions/send", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&SendRequest {
                session_key,
                message,
                timeout_seconds: self.timeout_seconds,
            })
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %details, "gateway rejected chat message");
            return Err(ChatError::Upstream {
                status: status.as_u16(),
                details,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub success: bool,
    pub agent_id: String,
    pub response: Value,
    /// RFC 3339 time the reply was received.
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub status: String,
    pub agents: Vec<String>,
    pub gateway_configured: bool,
}

pub struct ChatRelay {
    gateway: Option<Arc<dyn ChatGateway>>,
    sessions: BTreeMap<String, String>,
}

impl ChatRelay {
    pub fn new(gateway: Option<Arc<dyn ChatGateway>>, sessions: BTreeMap<String, String>) -> Self {
        Self { gateway, sessions }
    }

    /// Build the relay from `[gateway]` settings. Without a token the relay
    /// still answers status queries but refuses to send.
    pub fn from_config(cfg: &GatewaySection) -> Result<Self> {
        let gateway: Option<Arc<dyn ChatGateway>> = match &cfg.token {
            Some(token) => Some(Arc::new(HttpGateway::new(
                &cfg.url,
                token,
                cfg.timeout_seconds,
            )?)),
            None => None,
        };
        Ok(Self::new(gateway, cfg.sessions.clone()))
    }

    pub fn status(&self) -> RelayStatus {
        RelayStatus {
            status: "ok".to_string(),
            agents: self.sessions.keys().cloned().collect(),
            gateway_configured: self.gateway.is_some(),
        }
    }

    pub async fn relay(&self, agent_id: &str, message: &str) -> Result<ChatReply, ChatError> {
        if agent_id.is_empty() || message.is_empty() {
            return Err(ChatError::MissingFields);
        }
        let gateway = self.gateway.as_ref().ok_or(ChatError::NotConfigured)?;
        let session_key = self
            .sessions
            .get(&agent_id.to_lowercase())
            .ok_or_else(|| ChatError::UnknownAgent(agent_id.to_string()))?;

        let text = format!("{} {}", CHAT_PREFIX, message);
        let data = gateway.send(session_key, &text).await?;
        tracing::debug!(agent = agent_id, session = %session_key, "chat message delivered");

        Ok(ChatReply {
            success: true,
            agent_id: agent_id.to_string(),
            response: extract_response(&data),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        })
    }
}

/// Pick the agent's answer out of a gateway reply: `response`, then
/// `message`, then a placeholder.
fn extract_response(data: &Value) -> Value {
    ["response", "message"]
        .iter()
        .filter_map(|key| data.get(key))
        .find(|v| is_truthy(v))
        .cloned()
        .unwrap_or_else(|| Value::String("No response".to_string()))
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::HeaderMap, http::StatusCode, routing::post};
    use std::sync::Mutex;

    struct RecordingGateway {
        reply: Result<Value, (u16, String)>,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatGateway for RecordingGateway {
        async fn send(&self, session_key: &str, message: &str) -> Result<Value, ChatError> {
            self.sent
                .lock()
                .unwrap()
                .push((session_key.to_string(), message.to_string()));
            self.reply.clone().map_err(|(status, details)| ChatError::Upstream { status, details })
        }
    }

    fn sessions() -> BTreeMap<String, String> {
        BTreeMap::from([("franky".to_string(), "franky-main".to_string())])
    }

    fn relay_with(reply: Result<Value, (u16, String)>) -> (ChatRelay, Arc<RecordingGateway>) {
        let gw = Arc::new(RecordingGateway {
            reply,
            sent: Mutex::new(Vec::new()),
        });
        (ChatRelay::new(Some(gw.clone()), sessions()), gw)
    }

    #[test]
    fn test_extract_response_precedence() {
        assert_eq!(
            extract_response(&serde_json::json!({"response": "hi", "message": "m"})),
            "hi"
        );
        assert_eq!(
            extract_response(&serde_json::json!({"response": "", "message": "m"})),
            "m"
        );
        assert_eq!(extract_response(&serde_json::json!({})), "No response");
    }

    #[tokio::test]
    async fn test_relay_maps_agent_case_insensitively_and_prefixes() {
        let (relay, gw) = relay_with(Ok(serde_json::json!({"response": "On it!"})));
        let reply = relay.relay("Franky", "build the thing").await.unwrap();
        assert!(reply.success);
        assert_eq!(reply.agent_id, "Franky");
        assert_eq!(reply.response, "On it!");
        let sent = gw.sent.lock().unwrap();
        assert_eq!(sent[0].0, "franky-main");
        assert_eq!(sent[0].1, "[Mission Control Chat] build the thing");
    }

    #[tokio::test]
    async fn test_relay_validation_order() {
        let (relay, _) = relay_with(Ok(Value::Null));
        assert!(matches!(
            relay.relay("", "x").await,
            Err(ChatError::MissingFields)
        ));
        assert!(matches!(
            relay.relay("goku", "x").await,
            Err(ChatError::UnknownAgent(id)) if id == "goku"
        ));

        let unconfigured = ChatRelay::new(None, sessions());
        assert!(matches!(
            unconfigured.relay("goku", "x").await,
            Err(ChatError::NotConfigured)
        ));
        assert!(!unconfigured.status().gateway_configured);
    }

    #[tokio::test]
    async fn test_relay_passes_upstream_failure_through() {
        let (relay, _) = relay_with(Err((503, "busy".to_string())));
        match relay.relay("franky", "hello").await {
            Err(ChatError::Upstream { status, details }) => {
                assert_eq!(status, 503);
                assert_eq!(details, "busy");
            }
            other => panic!("Expected Upstream, got {:?}", other.map(|r| r.response)),
        }
    }

    #[test]
    fn test_status_lists_configured_agents() {
        let relay = ChatRelay::from_config(&GatewaySection::default()).unwrap();
        let status = relay.status();
        assert_eq!(status.status, "ok");
        assert_eq!(status.agents.len(), 8);
        assert!(status.agents.contains(&"hoyuelo".to_string()));
        assert!(!status.gateway_configured);
    }

    async fn mock_gateway(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_gateway_sends_bearer_and_body() {
        let router = Router::new().route(
            "/api/sessions/send",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(serde_json::json!({
                    "message": format!("{}|{}|{}|{}", auth, body["sessionKey"], body["message"], body["timeoutSeconds"]),
                }))
            }),
        );
        let url = mock_gateway(router).await;

        let gw = HttpGateway::new(&format!("{}/", url), "s3cret", 120).unwrap();
        let data = gw.send("robin", "hi").await.unwrap();
        assert_eq!(data["message"], "Bearer s3cret|\"robin\"|\"hi\"|120");
    }

    #[tokio::test]
    async fn test_http_gateway_reports_upstream_status() {
        let router = Router::new().route(
            "/api/sessions/send",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad token") }),
        );
        let url = mock_gateway(router).await;

        let gw = HttpGateway::new(&url, "nope", 5).unwrap();
        match gw.send("robin", "hi").await {
            Err(ChatError::Upstream { status, details }) => {
                assert_eq!(status, 401);
                assert_eq!(details, "bad token");
            }
            other => panic!("Expected Upstream, got {:?}", other),
        }
    }
}
