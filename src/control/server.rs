use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::api::{self, AppState, SharedState};
use super::db::{DbHandle, MissionDb};
use super::gateway::ChatRelay;
use super::health::HealthThresholds;
use super::webhooks;
use super::ws;
use crate::mission_config::{GatewaySection, MissionConfig};

/// Configuration for the Mission Control server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
    /// Built dashboard assets; served for any path the API doesn't claim.
    pub static_dir: Option<PathBuf>,
    pub sprites_dir: PathBuf,
    pub gateway: GatewaySection,
    pub health: HealthThresholds,
    pub feed_limit: usize,
    pub open_browser: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            db_path: PathBuf::from(".mission/mission.db"),
            dev_mode: false,
            static_dir: None,
            sprites_dir: PathBuf::from("public/sprites"),
            gateway: GatewaySection::default(),
            health: HealthThresholds::default(),
            feed_limit: super::db::DEFAULT_ACTIVITY_LIMIT,
            open_browser: false,
        }
    }
}

impl ServerConfig {
    pub fn from_config(cfg: &MissionConfig) -> Self {
        Self {
            host: cfg.toml.server.host.clone(),
            port: cfg.toml.server.port,
            db_path: cfg.db_path(),
            dev_mode: cfg.toml.server.dev_mode,
            static_dir: cfg.static_dir(),
            sprites_dir: cfg.sprites_dir(),
            gateway: cfg.toml.gateway.clone(),
            health: cfg.toml.health,
            feed_limit: cfg.toml.feed.default_limit,
            open_browser: false,
        }
    }

    /// Open the dashboard in a browser once listening. Applies in dev mode too.
    pub fn with_open_browser(mut self, open: bool) -> Self {
        self.open_browser = open;
        self
    }
}

/// Build the full application router: dashboard API, agent webhooks, the
/// live feed and, when configured, the static dashboard.
///
/// `dev_cors` opens the dashboard API to any origin. Webhooks always answer
/// with their own fixed CORS headers and are left out of that layer.
pub fn build_router(state: SharedState, static_dir: Option<&Path>, dev_cors: bool) -> Router {
    let api = if dev_cors {
        api::api_router().layer(CorsLayer::permissive())
    } else {
        api::api_router()
    };
    let router = api
        .merge(webhooks::webhook_router())
        .route("/ws", get(ws::ws_handler));

    let router = match static_dir {
        Some(dir) => router.fallback_service(
            ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
        ),
        None => router.fallback(not_found),
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Not found"})),
    )
}

/// Start the Mission Control server and run until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    // Ensure parent directory exists for DB
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let db = MissionDb::new(&config.db_path).context("Failed to initialize mission database")?;
    let (ws_tx, _rx) = broadcast::channel::<String>(256);
    let chat = ChatRelay::from_config(&config.gateway)?;
    if config.gateway.token.is_none() {
        tracing::warn!("OPENCLAW_GATEWAY_TOKEN not set; agent chat is disabled");
    }

    let state = Arc::new(AppState {
        db: DbHandle::new(db),
        ws_tx,
        chat,
        health: config.health,
        feed_limit: config.feed_limit,
        sprites_dir: config.sprites_dir.clone(),
    });

    let app = build_router(state, config.static_dir.as_deref(), config.dev_mode);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    let url = format!("http://{}", local_addr);
    tracing::info!(
        %url,
        db = %config.db_path.display(),
        dev_mode = config.dev_mode,
        "Mission Control running"
    );
    println!("Mission Control running at {}", url);

    if config.open_browser {
        if let Err(e) = open::that(&url) {
            tracing::warn!(error = %e, "Failed to open browser");
        }
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::api::test_state;
    use axum::body::Body;
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_router() -> Router {
        build_router(test_state(), None, false)
    }

    #[tokio::test]
    async fn test_health_via_full_router() {
        let app = test_router();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_and_webhooks_mounted() {
        let app = test_router();
        for uri in ["/api/agents", "/agents", "/api/board"] {
            let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_dev_cors_leaves_webhook_preflight_alone() {
        let app = build_router(test_state(), None, true);
        let preflight = |uri: &str| {
            Request::builder()
                .method("OPTIONS")
                .uri(uri)
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap()
        };

        let resp = app
            .clone()
            .oneshot(preflight("/agent/heartbeat"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            resp.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, OPTIONS"
        );
        assert_eq!(
            resp.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type, Authorization"
        );

        let resp = app.oneshot(preflight("/api/agents")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_unknown_route_without_static_dir() {
        let app = test_router();
        let req = Request::builder()
            .uri("/some/client/route")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_static_dir_serves_spa() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>Mission Control</h1>").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log('hi')").unwrap();
        let app = build_router(test_state(), Some(dir.path()), false);

        let req = Request::builder()
            .uri("/app.js")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"console.log('hi')");

        // Client-side routes fall back to index.html.
        let req = Request::builder()
            .uri("/board/42")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("Mission Control"));

        // API routes still win over the static fallback.
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"ok");
    }

    #[test]
    fn test_server_config_from_mission_config() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = MissionConfig::new(dir.path().to_path_buf())
            .unwrap()
            .with_cli_overrides(Some(4100), None, true);
        let server = ServerConfig::from_config(&cfg);
        assert_eq!(server.port, 4100);
        assert!(server.dev_mode);
        assert!(server.db_path.ends_with(".mission/mission.db"));
        assert!(server.sprites_dir.ends_with("public/sprites"));
        assert!(!server.open_browser);
    }

    #[test]
    fn test_open_browser_honored_in_dev_mode() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = MissionConfig::new(dir.path().to_path_buf())
            .unwrap()
            .with_cli_overrides(None, None, true);
        let server = ServerConfig::from_config(&cfg).with_open_browser(true);
        assert!(server.dev_mode);
        assert!(server.open_browser);
    }
}
