//! Bidirectional copy between a WebSocket client and a raw TCP upstream

use crate::{CLOSE_SESSION_NOT_FOUND, CLOSE_UPSTREAM_UNREACHABLE};
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::Bytes;
use deskrelay_registry::SessionRegistry;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("upstream {addr} unreachable: {source}")]
    UpstreamUnreachable {
        addr: String,
        source: std::io::Error,
    },
}

/// Bridge one client connection to its session's VNC server
///
/// Validates the session id against the registry, dials the session's remote
/// port, then runs the two copy directions concurrently until either side
/// closes. The first direction to finish cancels the other and both endpoints
/// are dropped; exactly one shutdown sequence runs per connection pair.
pub async fn relay(
    socket: WebSocket,
    session_id: &str,
    registry: &SessionRegistry,
    upstream_host: &str,
) -> Result<(), BridgeError> {
    let connection_id = format!("bridge-{}", uuid::Uuid::new_v4());

    let record = match registry.get(session_id) {
        Some(record) if record.is_running() => record,
        _ => {
            debug!(connection = %connection_id, session_id, "rejecting bridge for unknown session");
            close_with(
                socket,
                CLOSE_SESSION_NOT_FOUND,
                format!("session {} not found", session_id),
            )
            .await;
            return Err(BridgeError::SessionNotFound(session_id.to_string()));
        }
    };

    let addr = format!("{}:{}", upstream_host, record.remote_port);
    let upstream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(source) => {
            warn!(connection = %connection_id, session_id, %addr, %source, "upstream unreachable");
            close_with(
                socket,
                CLOSE_UPSTREAM_UNREACHABLE,
                "upstream unreachable".to_string(),
            )
            .await;
            return Err(BridgeError::UpstreamUnreachable { addr, source });
        }
    };

    // interactive protocol; never batch small writes
    if let Err(err) = upstream.set_nodelay(true) {
        debug!(connection = %connection_id, %err, "could not set TCP_NODELAY");
    }

    debug!(connection = %connection_id, session_id, %addr, "bridge established");

    let bytes_to_upstream = Arc::new(AtomicU64::new(0));
    let bytes_to_client = Arc::new(AtomicU64::new(0));

    let (mut upstream_read, mut upstream_write) = upstream.into_split();
    let (mut ws_sink, mut ws_stream) = socket.split();

    // Each WebSocket message is one unit of the carried protocol; its payload
    // goes through unmodified.
    let to_upstream_counter = bytes_to_upstream.clone();
    let mut client_to_upstream = tokio::spawn(async move {
        while let Some(message) = ws_stream.next().await {
            match message {
                Ok(Message::Binary(data)) => {
                    to_upstream_counter.fetch_add(data.len() as u64, Ordering::Relaxed);
                    if upstream_write.write_all(&data).await.is_err() {
                        break;
                    }
                    if upstream_write.flush().await.is_err() {
                        break;
                    }
                }
                Ok(Message::Text(text)) => {
                    to_upstream_counter.fetch_add(text.len() as u64, Ordering::Relaxed);
                    if upstream_write.write_all(text.as_bytes()).await.is_err() {
                        break;
                    }
                    if upstream_write.flush().await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                // ping/pong are answered by axum itself
                Ok(_) => {}
                Err(_) => break,
            }
        }
        let _ = upstream_write.shutdown().await;
    });

    let to_client_counter = bytes_to_client.clone();
    let mut upstream_to_client = tokio::spawn(async move {
        let mut buffer = vec![0u8; 8192];
        loop {
            match upstream_read.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => {
                    to_client_counter.fetch_add(n as u64, Ordering::Relaxed);
                    let chunk = Bytes::copy_from_slice(&buffer[..n]);
                    if ws_sink.send(Message::Binary(chunk)).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        let _ = ws_sink
            .send(Message::Close(Some(CloseFrame {
                code: 1000,
                reason: "upstream closed".into(),
            })))
            .await;
    });

    // first side to finish tears the other down; aborting a finished task is
    // a no-op, so the shutdown sequence runs exactly once
    tokio::select! {
        _ = &mut client_to_upstream => upstream_to_client.abort(),
        _ = &mut upstream_to_client => client_to_upstream.abort(),
    }

    debug!(
        connection = %connection_id,
        session_id,
        bytes_to_upstream = bytes_to_upstream.load(Ordering::Relaxed),
        bytes_to_client = bytes_to_client.load(Ordering::Relaxed),
        "bridge closed"
    );

    Ok(())
}

async fn close_with(mut socket: WebSocket, code: u16, reason: String) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(err) = socket.send(Message::Close(Some(frame))).await {
        debug!(%err, "client already gone during close");
    }
}
