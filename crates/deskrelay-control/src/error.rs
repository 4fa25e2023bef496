//! Control-plane errors
//!
//! Every failure here is scoped to the single operation that triggered it;
//! none of these should take the process down.

use deskrelay_ports::PortError;
use deskrelay_runtime::RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    /// Port allocation failed (exhausted band or adoption conflict);
    /// fatal to the single create call only.
    #[error(transparent)]
    Ports(#[from] PortError),

    /// The external launcher failed, or the session never reported ready.
    /// Captured output is preserved for diagnosis.
    #[error("session launch failed: {reason}")]
    LaunchFailed {
        reason: String,
        stdout: String,
        stderr: String,
    },

    /// Unknown session id.
    #[error("session not found: {0}")]
    NotFound(String),

    /// The runtime query itself failed; registry left at last-known-good.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl ControlError {
    /// Launch failure with diagnostics from the captured streams
    pub fn launch_failed(
        reason: impl Into<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        ControlError::LaunchFailed {
            reason: reason.into(),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}
