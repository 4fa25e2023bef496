//! Session lifecycle orchestration
//!
//! Per-session state machine: Starting → Running → Stopping → Stopped, with
//! Starting → Stopped on launch failure. A `Starting` record is provisional:
//! it exists so concurrent operations see the reserved ports, but discovery
//! and cleanup leave it alone until the ready marker promotes it.

use crate::error::ControlError;
use deskrelay_ports::{PortAllocator, PortBand};
use deskrelay_proto::{
    scan_ready_marker, LaunchPorts, ReadyProbe, SessionRecord, SessionState, StopDisposition,
};
use deskrelay_registry::SessionRegistry;
use deskrelay_runtime::{parse_launch_payload, ContainerRuntime, SessionLauncher};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A successfully created session, as returned to the API layer
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub record: SessionRecord,
    /// DevTools websocket endpoint reported by the launcher, if any
    pub ws_endpoint: Option<String>,
}

/// Outcome of a stop call; stop is idempotent, so both variants are success
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The session was tracked and has been stopped and dropped
    Stopped { id: String },
    /// The session was already gone; not an error
    AlreadyAbsent { id: String },
}

impl StopOutcome {
    pub fn id(&self) -> &str {
        match self {
            StopOutcome::Stopped { id } | StopOutcome::AlreadyAbsent { id } => id,
        }
    }

    /// Human-readable note for the already-absent case
    pub fn note(&self) -> Option<&'static str> {
        match self {
            StopOutcome::Stopped { .. } => None,
            StopOutcome::AlreadyAbsent { .. } => Some("session was already stopped or removed"),
        }
    }
}

/// Ports held by an in-flight create, rolled back on failure
struct PortLease {
    debug_port: u16,
    vnc_port: u16,
    display: u16,
}

/// Drives session create/stop/cleanup against registry, allocator and runtime
pub struct SessionManager {
    registry: SessionRegistry,
    allocator: Arc<PortAllocator>,
    runtime: Arc<dyn ContainerRuntime>,
    launcher: Arc<dyn SessionLauncher>,
    ready_timeout: Duration,
    poll_interval: Duration,
}

impl SessionManager {
    pub fn new(
        registry: SessionRegistry,
        allocator: Arc<PortAllocator>,
        runtime: Arc<dyn ContainerRuntime>,
        launcher: Arc<dyn SessionLauncher>,
    ) -> Self {
        Self {
            registry,
            allocator,
            runtime,
            launcher,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Bound the wait for the ready marker
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Interval between captured-output polls
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The registry this manager mutates (read by the bridge and API layer)
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub(crate) fn allocator(&self) -> &PortAllocator {
        &self.allocator
    }

    pub(crate) fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    /// Create a new session
    ///
    /// Allocates one port from each band, invokes the launcher, and waits for
    /// the session's protocol server to report ready. On any failure the
    /// reservations are released and no record survives.
    pub async fn create(&self) -> Result<CreatedSession, ControlError> {
        let lease = self.lease_ports()?;
        let ports = LaunchPorts {
            debug_port: lease.debug_port,
            vnc_port: lease.vnc_port,
            display: lease.display,
        };

        let output = match self.launcher.launch(ports).await {
            Ok(output) => output,
            Err(err) => {
                self.release_lease(&lease);
                return Err(err.into());
            }
        };

        if !output.success {
            self.release_lease(&lease);
            return Err(ControlError::launch_failed(
                "launcher exited with failure",
                output.stdout,
                output.stderr,
            ));
        }

        let payload = match parse_launch_payload(&output.stdout) {
            Ok(payload) => payload,
            Err(err) => {
                self.release_lease(&lease);
                return Err(ControlError::launch_failed(
                    err.to_string(),
                    output.stdout,
                    output.stderr,
                ));
            }
        };

        let id = payload.container_id;
        self.registry.insert(SessionRecord::starting(
            id.clone(),
            lease.vnc_port,
            lease.debug_port,
            lease.display,
        ));

        let confirmed_port = match self.await_ready(&id).await {
            Ok(port) => port,
            Err(err) => {
                // roll back the provisional record; the container itself is
                // left for a later discovery pass to adopt if it ever
                // becomes ready
                self.registry.remove(&id);
                self.release_lease(&lease);
                return Err(err);
            }
        };

        if confirmed_port != lease.vnc_port {
            debug!(
                id = %id,
                requested = lease.vnc_port,
                confirmed = confirmed_port,
                "session negotiated a different protocol port"
            );
            self.allocator.release(PortBand::Vnc, lease.vnc_port);
            if let Err(err) = self.allocator.reserve(PortBand::Vnc, confirmed_port) {
                self.registry.remove(&id);
                self.allocator.release(PortBand::Debug, lease.debug_port);
                self.allocator.release(PortBand::Display, lease.display);
                return Err(err.into());
            }
        }

        let Some(record) = self.registry.promote(&id, confirmed_port) else {
            // a racing stop() observed the provisional record and won;
            // its cleanup released the other reservations already
            self.allocator.release(PortBand::Vnc, confirmed_port);
            return Err(ControlError::NotFound(id));
        };

        info!(
            id = %record.id,
            remote_port = record.remote_port,
            debug_port = ?record.debug_port,
            display = ?record.display,
            "session created"
        );

        Ok(CreatedSession {
            record,
            ws_endpoint: payload.ws_endpoint,
        })
    }

    /// Stop a session; idempotent
    ///
    /// The record is dropped and its ports released regardless of what the
    /// runtime says about the stop itself: a session the runtime claims is
    /// already stopped is a successful stop.
    pub async fn stop(&self, id: &str) -> StopOutcome {
        let Some(record) = self.registry.get(id) else {
            debug!(id, "stop requested for untracked session");
            return StopOutcome::AlreadyAbsent { id: id.to_string() };
        };

        self.registry.set_state(id, SessionState::Stopping);

        match self.runtime.stop(id).await {
            Ok(StopDisposition::Stopped) => info!(id, "session stopped"),
            Ok(StopDisposition::AlreadyAbsent) => {
                debug!(id, "runtime reports session already stopped")
            }
            Err(err) => warn!(id, %err, "stop command failed, dropping session anyway"),
        }

        self.release_record_ports(&record);
        self.registry.remove(id);

        StopOutcome::Stopped { id: id.to_string() }
    }

    /// Drop every tracked session the runtime no longer reports as running
    ///
    /// Returns the removed ids. Provisional records are skipped: they belong
    /// to an in-flight create and are not yet expected to be visible.
    pub async fn cleanup(&self) -> Result<Vec<String>, ControlError> {
        let reports = self.runtime.list_sessions().await?;
        let present: HashSet<String> = reports
            .into_iter()
            .filter(|r| r.is_running)
            .map(|r| r.id)
            .collect();

        let mut removed = Vec::new();
        for record in self.registry.list() {
            if record.is_provisional() || present.contains(&record.id) {
                continue;
            }
            self.registry.remove(&record.id);
            self.release_record_ports(&record);
            info!(id = %record.id, "cleaned up vanished session");
            removed.push(record.id);
        }

        Ok(removed)
    }

    /// Poll the session's captured output for the ready marker, bounded
    async fn await_ready(&self, id: &str) -> Result<u16, ControlError> {
        let deadline = Instant::now() + self.ready_timeout;
        let mut last_output = String::new();

        loop {
            match self.runtime.capture_output(id).await {
                Ok(output) => {
                    last_output = output;
                    match scan_ready_marker(&last_output) {
                        ReadyProbe::Ready(port) => return Ok(port),
                        ReadyProbe::Failed(reason) => {
                            return Err(ControlError::launch_failed(reason, last_output, ""));
                        }
                        ReadyProbe::Pending => {}
                    }
                }
                // output may not be capturable yet right after launch
                Err(err) => debug!(id, %err, "captured output not available yet"),
            }

            if Instant::now() >= deadline {
                return Err(ControlError::launch_failed(
                    format!(
                        "ready marker not observed within {}s",
                        self.ready_timeout.as_secs()
                    ),
                    last_output,
                    "",
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn lease_ports(&self) -> Result<PortLease, ControlError> {
        let debug_port = self.allocator.allocate(PortBand::Debug)?;
        let vnc_port = match self.allocator.allocate(PortBand::Vnc) {
            Ok(port) => port,
            Err(err) => {
                self.allocator.release(PortBand::Debug, debug_port);
                return Err(err.into());
            }
        };
        let display = match self.allocator.allocate(PortBand::Display) {
            Ok(port) => port,
            Err(err) => {
                self.allocator.release(PortBand::Debug, debug_port);
                self.allocator.release(PortBand::Vnc, vnc_port);
                return Err(err.into());
            }
        };

        Ok(PortLease {
            debug_port,
            vnc_port,
            display,
        })
    }

    fn release_lease(&self, lease: &PortLease) {
        self.allocator.release(PortBand::Debug, lease.debug_port);
        self.allocator.release(PortBand::Vnc, lease.vnc_port);
        self.allocator.release(PortBand::Display, lease.display);
    }

    pub(crate) fn release_record_ports(&self, record: &SessionRecord) {
        self.allocator.release(PortBand::Vnc, record.remote_port);
        if let Some(port) = record.debug_port {
            self.allocator.release(PortBand::Debug, port);
        }
        if let Some(display) = record.display {
            self.allocator.release(PortBand::Display, display);
        }
    }
}
