//! Session launch script invocation

use crate::{RuntimeError, RuntimeResult, SessionLauncher};
use async_trait::async_trait;
use deskrelay_proto::{LaunchOutput, LaunchPayload, LaunchPorts};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Launcher that runs the configured session launch script
///
/// The script takes `<debug_port> <vnc_port> <display>` and, on success,
/// prints a JSON payload with the new session's id.
#[derive(Debug, Clone)]
pub struct ScriptLauncher {
    script: PathBuf,
}

impl ScriptLauncher {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[async_trait]
impl SessionLauncher for ScriptLauncher {
    async fn launch(&self, ports: LaunchPorts) -> RuntimeResult<LaunchOutput> {
        if !self.script.exists() {
            return Err(RuntimeError::LauncherMissing(
                self.script.display().to_string(),
            ));
        }

        info!(
            script = %self.script.display(),
            debug_port = ports.debug_port,
            vnc_port = ports.vnc_port,
            display = %ports.display_arg(),
            "launching session"
        );

        let command = format!("bash {}", self.script.display());
        let output = tokio::time::timeout(
            LAUNCH_TIMEOUT,
            Command::new("/bin/bash")
                .arg(&self.script)
                .arg(ports.debug_port.to_string())
                .arg(ports.vnc_port.to_string())
                .arg(ports.display_arg())
                .output(),
        )
        .await
        .map_err(|_| RuntimeError::Timeout {
            command,
            seconds: LAUNCH_TIMEOUT.as_secs(),
        })??;

        debug!(status = %output.status, "launcher exited");

        Ok(LaunchOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        })
    }
}

/// Parse the JSON payload the launch script prints on success
pub fn parse_launch_payload(stdout: &str) -> RuntimeResult<LaunchPayload> {
    serde_json::from_str(stdout.trim())
        .map_err(|err| RuntimeError::InvalidLauncherOutput(format!("{}: {}", err, stdout.trim())))
}
