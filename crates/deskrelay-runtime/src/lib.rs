//! External runtime interface
//!
//! The registry and orchestrator never talk to the container runtime
//! directly; they go through the trait seams defined here. The concrete
//! implementations (`DockerRuntime`, `ScriptLauncher`) shell out to the
//! docker CLI and the session launch script, every invocation bounded by a
//! timeout.

pub mod docker;
pub mod launcher;

pub use docker::DockerRuntime;
pub use launcher::{parse_launch_payload, ScriptLauncher};

use async_trait::async_trait;
use deskrelay_proto::{LaunchOutput, LaunchPorts, SessionReport, StopDisposition};
use thiserror::Error;

/// Runtime-level errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{command} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("launcher not found: {0}")]
    LauncherMissing(String),

    #[error("unparseable launcher output: {0}")]
    InvalidLauncherOutput(String),
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Query/stop interface to the external container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List sessions matching the configured convention, in the order the
    /// runtime reports them, with liveness and captured startup output.
    async fn list_sessions(&self) -> RuntimeResult<Vec<SessionReport>>;

    /// Fetch the captured startup output of one session
    async fn capture_output(&self, id: &str) -> RuntimeResult<String>;

    /// Stop a session; a session the runtime no longer knows is
    /// `AlreadyAbsent`, not an error.
    async fn stop(&self, id: &str) -> RuntimeResult<StopDisposition>;
}

/// Interface to the external session launcher
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Launch a new session with the given port parameters, capturing its
    /// stdout/stderr for diagnosis.
    async fn launch(&self, ports: LaunchPorts) -> RuntimeResult<LaunchOutput>;
}
