//! Docker-backed container runtime
//!
//! Sessions are containers started from a fixed image. Liveness comes from
//! `docker inspect`, startup output from `docker logs`. A container can be
//! listed but not running; reports carry the distinction instead of
//! filtering here.

use crate::{ContainerRuntime, RuntimeError, RuntimeResult};
use async_trait::async_trait;
use deskrelay_proto::{SessionReport, StopDisposition};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const LIST_TIMEOUT: Duration = Duration::from_secs(5);
const INSPECT_TIMEOUT: Duration = Duration::from_secs(2);
const LOGS_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Container runtime driven by the docker CLI
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    /// Image name identifying session containers (the naming convention)
    image: String,
}

impl DockerRuntime {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
        }
    }

    async fn run(&self, args: &[&str], timeout: Duration) -> RuntimeResult<Output> {
        let command = format!("docker {}", args.join(" "));
        debug!(%command, "running runtime command");

        let output = tokio::time::timeout(timeout, Command::new("docker").args(args).output())
            .await
            .map_err(|_| RuntimeError::Timeout {
                command: command.clone(),
                seconds: timeout.as_secs(),
            })??;

        Ok(output)
    }

    /// Run a command and require a zero exit status
    async fn run_checked(&self, args: &[&str], timeout: Duration) -> RuntimeResult<String> {
        let output = self.run(args, timeout).await?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: format!("docker {}", args.join(" ")),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Whether the runtime reports the container as currently running
    async fn is_running(&self, id: &str) -> RuntimeResult<bool> {
        let output = self
            .run(
                &["inspect", id, "--format", "{{.State.Running}}"],
                INSPECT_TIMEOUT,
            )
            .await?;
        // inspect fails for ids the runtime no longer knows
        Ok(output.status.success()
            && String::from_utf8_lossy(&output.stdout).trim() == "true")
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_sessions(&self) -> RuntimeResult<Vec<SessionReport>> {
        let ancestor = format!("ancestor={}", self.image);
        let stdout = self
            .run_checked(
                &["ps", "-a", "--filter", &ancestor, "--format", "{{.ID}}"],
                LIST_TIMEOUT,
            )
            .await?;

        let mut reports = Vec::new();
        for id in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let is_running = match self.is_running(id).await {
                Ok(running) => running,
                Err(err) => {
                    warn!(id, %err, "could not inspect session, treating as not running");
                    false
                }
            };

            let captured_output = if is_running {
                match self.capture_output(id).await {
                    Ok(output) => output,
                    Err(err) => {
                        warn!(id, %err, "could not read session output");
                        String::new()
                    }
                }
            } else {
                String::new()
            };

            reports.push(SessionReport {
                id: id.to_string(),
                is_running,
                captured_output,
            });
        }

        Ok(reports)
    }

    async fn capture_output(&self, id: &str) -> RuntimeResult<String> {
        let output = self.run(&["logs", id], LOGS_TIMEOUT).await?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: format!("docker logs {}", id),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        // the VNC banner may land on either stream
        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        captured.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(captured)
    }

    async fn stop(&self, id: &str) -> RuntimeResult<StopDisposition> {
        if !self.is_running(id).await? {
            debug!(id, "session already stopped or gone");
            return Ok(StopDisposition::AlreadyAbsent);
        }

        self.run_checked(&["stop", id], STOP_TIMEOUT).await?;
        debug!(id, "session stopped");
        Ok(StopDisposition::Stopped)
    }
}
