//! Session registry
//!
//! The authoritative in-memory map of session id to session record. This is
//! the single source of truth consulted by discovery, the lifecycle
//! orchestrator, and the proxy bridge. All access goes through one `RwLock`;
//! lookups clone a consistent snapshot, mutations are serialized.
//!
//! The registry is process-lifetime state: it is rebuilt by discovery on
//! startup and incrementally updated thereafter, with no persistence.

use deskrelay_proto::{SessionRecord, SessionState};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Result of reconciling the registry against a discovery pass
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Newly adopted sessions (not previously tracked)
    pub adopted: Vec<SessionRecord>,
    /// Previously tracked sessions confirmed still present
    pub kept: Vec<SessionRecord>,
    /// Sessions removed because the runtime no longer reports them
    pub removed: Vec<SessionRecord>,
}

/// Registry of tracked sessions
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl SessionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert or replace a record
    ///
    /// Returns the previous record for the same id, if any.
    pub fn insert(&self, record: SessionRecord) -> Option<SessionRecord> {
        let mut sessions = self.sessions.write().unwrap();
        let old = sessions.insert(record.id.clone(), record.clone());

        if old.is_some() {
            warn!(id = %record.id, "replaced existing session record");
        } else {
            info!(id = %record.id, remote_port = record.remote_port, state = %record.state, "registered session");
        }

        old
    }

    /// Get a snapshot of one record
    pub fn get(&self, id: &str) -> Option<SessionRecord> {
        let sessions = self.sessions.read().unwrap();
        sessions.get(id).cloned()
    }

    /// Remove a record by id
    ///
    /// Returns the record if it was tracked, or None if not found.
    pub fn remove(&self, id: &str) -> Option<SessionRecord> {
        let mut sessions = self.sessions.write().unwrap();
        let removed = sessions.remove(id);

        if removed.is_some() {
            info!(id = %id, "removed session record");
        } else {
            debug!(id = %id, "attempted to remove unknown session");
        }

        removed
    }

    /// Update a record's lifecycle state in place
    ///
    /// Returns false if the id is not tracked.
    pub fn set_state(&self, id: &str, state: SessionState) -> bool {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get_mut(id) {
            Some(record) => {
                record.state = state;
                true
            }
            None => false,
        }
    }

    /// Promote a provisional record to Running with its confirmed remote port
    ///
    /// Returns the promoted record, or None if the id is not tracked.
    pub fn promote(&self, id: &str, remote_port: u16) -> Option<SessionRecord> {
        let mut sessions = self.sessions.write().unwrap();
        let record = sessions.get_mut(id)?;
        record.remote_port = remote_port;
        record.state = SessionState::Running;
        info!(id = %id, remote_port, "session promoted to running");
        Some(record.clone())
    }

    /// List snapshots of all tracked records
    pub fn list(&self) -> Vec<SessionRecord> {
        let sessions = self.sessions.read().unwrap();
        sessions.values().cloned().collect()
    }

    /// Whether an id is tracked
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().unwrap().contains_key(id)
    }

    /// Number of tracked records
    pub fn count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Replace the discovery-sourced subset of the registry
    ///
    /// `discovered` is the set of sessions the runtime currently reports as
    /// running and ready. Records in `Starting` state are provisional,
    /// orchestrator-owned, and never touched here. Re-observed ids keep their
    /// existing record (auxiliary ports and created_at are known only to the
    /// orchestrator and would be lost by overwriting); ids absent from the
    /// discovered set are removed and returned so the caller can release
    /// their ports.
    pub fn reconcile(&self, discovered: Vec<SessionRecord>) -> Reconciliation {
        let mut sessions = self.sessions.write().unwrap();
        let mut outcome = Reconciliation::default();

        let discovered_ids: std::collections::HashSet<&str> =
            discovered.iter().map(|r| r.id.as_str()).collect();

        let stale: Vec<String> = sessions
            .values()
            .filter(|record| {
                !record.is_provisional() && !discovered_ids.contains(record.id.as_str())
            })
            .map(|record| record.id.clone())
            .collect();

        for id in stale {
            if let Some(record) = sessions.remove(&id) {
                info!(id = %id, "session no longer reported by runtime, dropped");
                outcome.removed.push(record);
            }
        }

        for record in discovered {
            match sessions.get(&record.id) {
                // Provisional or already tracked: the existing record wins
                Some(existing) => outcome.kept.push(existing.clone()),
                None => {
                    info!(id = %record.id, remote_port = record.remote_port, "adopted discovered session");
                    sessions.insert(record.id.clone(), record.clone());
                    outcome.adopted.push(record);
                }
            }
        }

        outcome
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
