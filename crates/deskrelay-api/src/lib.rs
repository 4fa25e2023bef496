//! HTTP/WebSocket API layer
//!
//! Exposes session management (`/api/sessions`) and the per-session VNC
//! bridge (`/vnc/{id}`) to the browser-facing front end. The front end itself
//! (static files, UI) is served elsewhere; this layer is JSON + WebSocket
//! only, with permissive CORS so a separately-served UI can call it.

pub mod handlers;
pub mod models;
pub mod ws;

use axum::{
    routing::{get, post},
    Router,
};
use deskrelay_control::SessionManager;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;

/// Application state shared across handlers
pub struct AppState {
    pub manager: Arc<SessionManager>,
    /// Host the bridge dials to reach session VNC ports
    pub upstream_host: String,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Deskrelay API",
        version = "0.1.0",
        description = "Session registry and VNC protocol bridge for container-hosted desktops"
    ),
    paths(
        handlers::list_sessions,
        handlers::create_session,
        handlers::stop_session,
        handlers::cleanup,
        handlers::discover_sessions,
        handlers::health_check,
    ),
    components(
        schemas(
            models::SessionStatus,
            models::Session,
            models::SessionList,
            models::CreateSessionResponse,
            models::StopSessionResponse,
            models::CleanupResponse,
            models::SessionConflict,
            models::DiscoverResponse,
            models::HealthResponse,
            models::ErrorResponse,
        )
    ),
    tags(
        (name = "sessions", description = "Session lifecycle and discovery endpoints"),
        (name = "system", description = "System health endpoints")
    )
)]
struct ApiDoc;

/// API server configuration
pub struct ApiServerConfig {
    /// Address to bind the API server
    pub bind_addr: SocketAddr,
    /// Enable permissive CORS (the UI is served from elsewhere)
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8123".parse().unwrap(),
            enable_cors: true,
        }
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, manager: Arc<SessionManager>, upstream_host: String) -> Self {
        let state = Arc::new(AppState {
            manager,
            upstream_host,
        });
        Self { config, state }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let api_doc = ApiDoc::openapi();

        let mut router = Router::new()
            .route("/api/health", get(handlers::health_check))
            .route(
                "/api/sessions",
                get(handlers::list_sessions).post(handlers::create_session),
            )
            .route("/api/sessions/{id}/stop", post(handlers::stop_session))
            .route("/api/sessions/cleanup", post(handlers::cleanup))
            .route("/api/sessions/discover", post(handlers::discover_sessions))
            .route(
                "/api/openapi.json",
                get(move || {
                    let doc = api_doc.clone();
                    async move { axum::Json(doc) }
                }),
            )
            .route("/vnc/{id}", get(ws::bridge_session))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }

    /// Start the API server
    pub async fn start(self) -> Result<(), anyhow::Error> {
        let router = self.build_router();

        info!("starting API server on {}", self.config.bind_addr);
        info!(
            "OpenAPI spec: http://{}/api/openapi.json",
            self.config.bind_addr
        );

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        axum::serve(listener, router)
            .await
            .map_err(|e| anyhow::anyhow!("server error: {}", e))?;

        Ok(())
    }
}
