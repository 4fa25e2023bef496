//! Session discovery
//!
//! Queries the external runtime for sessions created out-of-band and
//! reconciles them into the registry. Discovery is fail-soft: if the runtime
//! query itself fails, the registry and port reservations are left at their
//! last-known-good state and the error is reported to the caller.

use crate::error::ControlError;
use crate::manager::SessionManager;
use deskrelay_ports::PortBand;
use deskrelay_proto::{scan_ready_marker, ReadyProbe, SessionRecord};
use deskrelay_runtime::ContainerRuntime;
use tracing::{debug, info, warn};

/// A discovered session whose protocol port collides with an existing
/// reservation; surfaced instead of silently overwriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConflict {
    pub id: String,
    pub port: u16,
}

/// Result of one discovery pass
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    /// Sessions now tracked from discovery's point of view (adopted + kept)
    pub sessions: Vec<SessionRecord>,
    /// Sessions excluded because their port is already reserved
    pub conflicts: Vec<PortConflict>,
}

impl SessionManager {
    /// Discover sessions running in the external runtime
    ///
    /// Sessions the runtime lists but does not report as running are
    /// excluded, as are sessions whose captured output carries no ready
    /// marker yet (they will be retried on the next pass). Records owned by
    /// an in-flight create are never clobbered.
    pub async fn discover(&self) -> Result<DiscoveryOutcome, ControlError> {
        let reports = self.runtime().list_sessions().await?;

        let mut candidates = Vec::new();
        for report in reports {
            if !report.is_running {
                debug!(id = %report.id, "session listed but not running, skipping");
                continue;
            }
            match scan_ready_marker(&report.captured_output) {
                ReadyProbe::Ready(port) => {
                    candidates.push(SessionRecord::discovered(report.id, port));
                }
                ReadyProbe::Pending => {
                    debug!(id = %report.id, "no ready marker yet, retrying next pass");
                }
                ReadyProbe::Failed(reason) => {
                    warn!(id = %report.id, reason, "unusable ready marker, skipping");
                }
            }
        }

        // Reserve protocol ports for sessions not tracked yet; an existing
        // reservation means some other session (possibly one mid-creation)
        // owns that port, and the colliding session is surfaced, not adopted.
        let mut conflicts = Vec::new();
        let mut adoptable = Vec::new();
        for record in candidates {
            if self.registry().contains(&record.id) {
                adoptable.push(record);
                continue;
            }
            match self.allocator().reserve(PortBand::Vnc, record.remote_port) {
                Ok(()) => adoptable.push(record),
                Err(err) => {
                    warn!(id = %record.id, port = record.remote_port, %err, "discovered session conflicts with a reserved port");
                    conflicts.push(PortConflict {
                        id: record.id,
                        port: record.remote_port,
                    });
                }
            }
        }

        let reconciliation = self.registry().reconcile(adoptable);
        for record in &reconciliation.removed {
            self.release_record_ports(record);
        }

        info!(
            adopted = reconciliation.adopted.len(),
            kept = reconciliation.kept.len(),
            removed = reconciliation.removed.len(),
            conflicts = conflicts.len(),
            "discovery pass complete"
        );

        let mut sessions = reconciliation.kept;
        sessions.extend(reconciliation.adopted);

        Ok(DiscoveryOutcome {
            sessions,
            conflicts,
        })
    }
}
