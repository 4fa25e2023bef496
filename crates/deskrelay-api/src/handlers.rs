//! API handlers for session management

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use deskrelay_control::ControlError;
use deskrelay_ports::PortError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::*;
use crate::AppState;

/// List all tracked sessions
#[utoipa::path(
    get,
    path = "/api/sessions",
    responses(
        (status = 200, description = "Mapping of session id to session data", body = SessionList)
    ),
    tag = "sessions"
)]
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionList> {
    debug!("listing sessions");
    Json(SessionList::from_records(state.manager.registry().list()))
}

/// Create a new session
#[utoipa::path(
    post,
    path = "/api/sessions",
    responses(
        (status = 200, description = "Session created and ready", body = CreateSessionResponse),
        (status = 500, description = "Launcher failed or session never became ready", body = ErrorResponse),
        (status = 503, description = "No free port left", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CreateSessionResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!("creating session");
    match state.manager.create().await {
        Ok(created) => {
            info!(id = %created.record.id, remote_port = created.record.remote_port, "session created");
            Ok(Json(created.into()))
        }
        Err(err) => {
            warn!(%err, "session creation failed");
            Err(control_error_response(err))
        }
    }
}

/// Stop a session; idempotent
#[utoipa::path(
    post,
    path = "/api/sessions/{id}/stop",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    responses(
        (status = 200, description = "Session stopped (or already gone)", body = StopSessionResponse)
    ),
    tag = "sessions"
)]
pub async fn stop_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<StopSessionResponse> {
    info!(id = %id, "stopping session");
    Json(state.manager.stop(&id).await.into())
}

/// Drop tracked sessions the runtime no longer reports
#[utoipa::path(
    post,
    path = "/api/sessions/cleanup",
    responses(
        (status = 200, description = "Ids removed from tracking", body = CleanupResponse),
        (status = 502, description = "Runtime query failed", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn cleanup(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CleanupResponse>, (StatusCode, Json<ErrorResponse>)> {
    debug!("cleanup pass requested");
    match state.manager.cleanup().await {
        Ok(removed) => Ok(Json(CleanupResponse { removed })),
        Err(err) => {
            warn!(%err, "cleanup failed");
            Err(control_error_response(err))
        }
    }
}

/// Discover sessions running in the external runtime
#[utoipa::path(
    post,
    path = "/api/sessions/discover",
    responses(
        (status = 200, description = "Sessions currently tracked from discovery", body = DiscoverResponse),
        (status = 502, description = "Runtime query failed; registry unchanged", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn discover_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DiscoverResponse>, (StatusCode, Json<ErrorResponse>)> {
    debug!("discovery pass requested");
    match state.manager.discover().await {
        Ok(outcome) => {
            let sessions: BTreeMap<String, Session> = outcome
                .sessions
                .into_iter()
                .map(|record| (record.id.clone(), record.into()))
                .collect();
            Ok(Json(DiscoverResponse {
                sessions,
                conflicts: outcome.conflicts.into_iter().map(Into::into).collect(),
            }))
        }
        Err(err) => {
            warn!(%err, "discovery failed, registry left unchanged");
            Err(control_error_response(err))
        }
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let active_sessions = state
        .manager
        .registry()
        .list()
        .iter()
        .filter(|record| record.is_running())
        .count();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions,
    })
}

fn control_error_response(err: ControlError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        ControlError::Ports(PortError::Exhausted { .. }) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(err.to_string(), "resource_exhausted")),
        ),
        ControlError::Ports(PortError::Conflict { .. }) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(err.to_string(), "port_conflict")),
        ),
        ControlError::LaunchFailed {
            ref reason,
            ref stdout,
            ref stderr,
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: reason.clone(),
                code: Some("launcher_failed".to_string()),
                stdout: Some(stdout.clone()),
                stderr: Some(stderr.clone()),
            }),
        ),
        ControlError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(err.to_string(), "session_not_found")),
        ),
        ControlError::Runtime(_) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse::new(err.to_string(), "runtime_query_failed")),
        ),
    }
}
