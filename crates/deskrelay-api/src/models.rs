//! API data transfer models

use chrono::{DateTime, Utc};
use deskrelay_control::{CreatedSession, PortConflict, StopOutcome};
use deskrelay_proto::{SessionRecord, SessionState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Session lifecycle state as exposed over the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl From<SessionState> for SessionStatus {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Starting => SessionStatus::Starting,
            SessionState::Running => SessionStatus::Running,
            SessionState::Stopping => SessionStatus::Stopping,
            SessionState::Stopped => SessionStatus::Stopped,
        }
    }
}

/// One tracked session
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Session {
    /// Runtime-assigned session id
    pub id: String,
    /// VNC protocol port the bridge relays to
    pub remote_port: u16,
    /// DevTools debug port, if allocated by this process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_port: Option<u16>,
    /// X display number, if allocated by this process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<u16>,
    /// When the session was launched or first observed
    pub created_at: DateTime<Utc>,
    /// Lifecycle state
    pub status: SessionStatus,
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        Self {
            id: record.id,
            remote_port: record.remote_port,
            debug_port: record.debug_port,
            display: record.display,
            created_at: record.created_at,
            status: record.state.into(),
        }
    }
}

/// Mapping of session id to session data
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionList {
    pub sessions: BTreeMap<String, Session>,
    pub total: usize,
}

impl SessionList {
    pub fn from_records(records: Vec<SessionRecord>) -> Self {
        let sessions: BTreeMap<String, Session> = records
            .into_iter()
            .map(|record| (record.id.clone(), record.into()))
            .collect();
        let total = sessions.len();
        Self { sessions, total }
    }
}

/// Response to a successful session creation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateSessionResponse {
    pub id: String,
    pub remote_port: u16,
    pub debug_port: Option<u16>,
    pub display: Option<u16>,
    /// DevTools websocket endpoint reported by the launcher
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_endpoint: Option<String>,
}

impl From<CreatedSession> for CreateSessionResponse {
    fn from(created: CreatedSession) -> Self {
        Self {
            id: created.record.id,
            remote_port: created.record.remote_port,
            debug_port: created.record.debug_port,
            display: created.record.display,
            ws_endpoint: created.ws_endpoint,
        }
    }
}

/// Response to a stop request; stop is idempotent, so this is always success
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StopSessionResponse {
    pub stopped: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<StopOutcome> for StopSessionResponse {
    fn from(outcome: StopOutcome) -> Self {
        Self {
            stopped: outcome.id().to_string(),
            note: outcome.note().map(str::to_string),
        }
    }
}

/// Sessions dropped by a cleanup pass
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CleanupResponse {
    pub removed: Vec<String>,
}

/// A discovered session excluded because its port is already reserved
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionConflict {
    pub id: String,
    pub port: u16,
}

impl From<PortConflict> for SessionConflict {
    fn from(conflict: PortConflict) -> Self {
        Self {
            id: conflict.id,
            port: conflict.port,
        }
    }
}

/// Result of a discovery pass
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiscoverResponse {
    pub sessions: BTreeMap<String, Session>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub conflicts: Vec<SessionConflict>,
}

/// Service liveness
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_sessions: usize,
}

/// API error body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Launcher stdout, preserved for launch failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Launcher stderr, preserved for launch failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
            stdout: None,
            stderr: None,
        }
    }
}
