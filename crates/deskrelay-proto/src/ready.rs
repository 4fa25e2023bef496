//! Ready-marker scanning
//!
//! A session's VNC server announces readiness with a banner line in the
//! captured startup output. Scanning yields an explicit tri-state so callers
//! can distinguish "ready on port N", "no marker yet, retry later", and
//! "marker present but unusable".

use regex::Regex;
use std::sync::OnceLock;

/// The banner line printed by the session's VNC server once it accepts
/// connections, with the negotiated TCP port.
pub const READY_MARKER: &str = r"Listening for VNC connections on TCP port (\d+)";

/// Outcome of scanning captured output for the ready marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyProbe {
    /// Marker found; the session's protocol server accepts connections on this port
    Ready(u16),
    /// No marker yet; the session is still starting, retry on the next poll
    Pending,
    /// A marker was found but cannot be used (e.g. port out of range)
    Failed(String),
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(READY_MARKER).expect("ready-marker pattern is valid"))
}

/// Scan captured startup output for the first ready-marker line
pub fn scan_ready_marker(output: &str) -> ReadyProbe {
    let Some(captures) = marker_regex().captures(output) else {
        return ReadyProbe::Pending;
    };

    match captures[1].parse::<u16>() {
        Ok(port) => ReadyProbe::Ready(port),
        Err(_) => ReadyProbe::Failed(format!(
            "ready marker carries an unusable port: {}",
            &captures[1]
        )),
    }
}
