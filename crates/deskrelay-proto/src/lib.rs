//! Shared Session Types
//!
//! This crate defines the core data model shared by the deskrelay components:
//! session records and their lifecycle states, the reports returned by the
//! external container runtime, and the ready-marker scanner that extracts a
//! session's negotiated VNC port from its captured startup output.

pub mod ready;
pub mod session;

pub use ready::{scan_ready_marker, ReadyProbe, READY_MARKER};
pub use session::{
    LaunchOutput, LaunchPayload, LaunchPorts, SessionRecord, SessionReport, SessionState,
    StopDisposition,
};
