//! Control plane for session orchestration
//!
//! The `SessionManager` drives the session lifecycle (create, stop, cleanup)
//! and reconciles the registry with sessions discovered in the external
//! runtime. It is the only writer of the registry and the port allocator;
//! the proxy bridge reads the registry directly.

pub mod discovery;
pub mod error;
pub mod manager;

pub use discovery::{DiscoveryOutcome, PortConflict};
pub use error::ControlError;
pub use manager::{CreatedSession, SessionManager, StopOutcome};
