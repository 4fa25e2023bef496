//! WebSocket to VNC proxy bridge
//!
//! Relays raw bytes between a message-framed WebSocket client and the byte
//! stream of a session's VNC server. This is the latency-critical path: the
//! carried protocol is interactive screen/input traffic, so every payload is
//! forwarded as soon as it arrives and nothing is parsed or buffered beyond
//! what the transports require.

pub mod relay;

pub use relay::{relay, BridgeError};

/// Close code sent when the requested session id is unknown or not running
pub const CLOSE_SESSION_NOT_FOUND: u16 = 1008;

/// Close code sent when the session's VNC port cannot be reached
pub const CLOSE_UPSTREAM_UNREACHABLE: u16 = 1011;
