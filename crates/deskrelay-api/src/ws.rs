//! WebSocket bridge entry point
//!
//! `GET /vnc/{id}` upgrades the connection and hands it to the proxy bridge.
//! Rejections (unknown id, unreachable upstream) happen after the upgrade so
//! the client receives a distinguishable close frame instead of a silent
//! handshake failure.

use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use deskrelay_bridge::relay;
use std::sync::Arc;
use tracing::debug;

use crate::AppState;

pub async fn bridge_session(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let registry = state.manager.registry().clone();
        if let Err(err) = relay(socket, &id, &registry, &state.upstream_host).await {
            debug!(session_id = %id, %err, "bridge ended with error");
        }
    })
}
