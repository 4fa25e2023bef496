//! Session records and runtime report types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a tracked session
///
/// `Starting` records are provisional: they are owned by an in-flight create
/// and are invisible to discovery reconciliation and cleanup until promoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// A tracked desktop session and the ports it owns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque id assigned by the external runtime (container id)
    pub id: String,
    /// Confirmed or allocated VNC protocol port
    pub remote_port: u16,
    /// Allocated DevTools debug port (unknown for adopted sessions)
    pub debug_port: Option<u16>,
    /// Allocated X display number (unknown for adopted sessions)
    pub display: Option<u16>,
    /// When the session was first launched or observed
    pub created_at: DateTime<Utc>,
    /// Lifecycle state
    pub state: SessionState,
}

impl SessionRecord {
    /// Record for a session launched by the orchestrator, not yet confirmed ready
    pub fn starting(id: String, remote_port: u16, debug_port: u16, display: u16) -> Self {
        Self {
            id,
            remote_port,
            debug_port: Some(debug_port),
            display: Some(display),
            created_at: Utc::now(),
            state: SessionState::Starting,
        }
    }

    /// Record for a running session adopted from a runtime query
    pub fn discovered(id: String, remote_port: u16) -> Self {
        Self {
            id,
            remote_port,
            debug_port: None,
            display: None,
            created_at: Utc::now(),
            state: SessionState::Running,
        }
    }

    /// Whether the bridge may route to this session
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Whether this record is owned by an in-flight create
    pub fn is_provisional(&self) -> bool {
        self.state == SessionState::Starting
    }
}

/// One session as reported by the external runtime query
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Runtime-assigned session id
    pub id: String,
    /// Whether the runtime reports the session as actually running
    /// (a session can be listed but not running)
    pub is_running: bool,
    /// Captured startup output (used for ready-marker scanning)
    pub captured_output: String,
}

/// Result of asking the runtime to stop a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDisposition {
    /// The runtime stopped the session
    Stopped,
    /// The session was already gone or already stopped
    AlreadyAbsent,
}

/// Port parameters handed to the external launcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchPorts {
    pub debug_port: u16,
    pub vnc_port: u16,
    pub display: u16,
}

impl LaunchPorts {
    /// X display argument in the `:N` form the launcher expects
    pub fn display_arg(&self) -> String {
        format!(":{}", self.display)
    }
}

/// Captured result of a launcher invocation
#[derive(Debug, Clone)]
pub struct LaunchOutput {
    pub stdout: String,
    pub stderr: String,
    /// Whether the launcher exited successfully
    pub success: bool,
}

/// JSON payload the launch script prints on success
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchPayload {
    /// Runtime-assigned session id
    pub container_id: String,
    /// DevTools websocket endpoint, if the launcher reported one
    #[serde(default)]
    pub ws_endpoint: Option<String>,
}
