//! WebSocket connection handler.
//!
//! Provides the upgrade handler and the per-connection loop. Every text
//! frame a peer sends is rebroadcast verbatim to every open connection,
//! the sender included.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use funnel_sdk::EventEnvelope;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::connection::{Connection, ConnectionState};
use super::gate::RemoteAddr;
use super::metrics::RelayMetrics;
use crate::server::AppState;

/// WebSocket upgrade handler.
///
/// The gate has already checked the path and `Upgrade` header; this
/// completes the handshake.
pub async fn ws_handler(
    State(state): State<AppState>,
    Extension(RemoteAddr(remote_addr)): Extension<RemoteAddr>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            state.metrics.record_upgrade_rejected();
            warn!(remote_addr = %remote_addr, "handshake rejected: {}", rejection);
            return rejection.into_response();
        }
    };

    let metrics = Arc::clone(&state.metrics);
    ws.on_failed_upgrade(move |e| {
        metrics.record_error();
        warn!("upgrade failed: {}", e);
    })
    .on_upgrade(move |socket| handle_connection(socket, state, remote_addr))
}

/// Handles one upgraded socket until it closes.
async fn handle_connection(socket: WebSocket, state: AppState, remote_addr: String) {
    let (tx, rx) = mpsc::channel::<Utf8Bytes>(state.config.outbound_buffer);
    let connection = Arc::new(Connection::new(remote_addr, tx));
    let connection_id = connection.id();

    // Registered before anything else so broadcasts fired from here on
    // reach this peer.
    connection.set_state(ConnectionState::Open);
    state.registry.register(Arc::clone(&connection)).await;
    state.metrics.record_connection_opened();
    info!(
        connection_id,
        remote_addr = connection.remote_addr(),
        "connection opened"
    );

    match EventEnvelope::hello(state.config.greeting.as_str()).encode() {
        Ok(json) => {
            if let Err(e) = connection.send(json.into()) {
                warn!(connection_id, "greeting not queued: {}", e);
            }
        }
        Err(e) => error!("failed to encode greeting: {}", e),
    }

    let (ws_sender, ws_receiver) = socket.split();
    let writer = tokio::spawn(write_loop(ws_sender, rx, Arc::clone(&state.metrics)));

    read_loop(ws_receiver, &connection, &state).await;

    // Cleanup
    connection.set_state(ConnectionState::Closing);
    state.registry.unregister(connection_id).await;
    writer.abort();
    connection.set_state(ConnectionState::Closed);
    state.metrics.record_connection_closed();

    info!(connection_id, "connection closed");
}

/// Forwards queued frames to the socket.
async fn write_loop(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Utf8Bytes>,
    metrics: Arc<RelayMetrics>,
) {
    while let Some(text) = rx.recv().await {
        if let Err(e) = ws_sender.send(Message::Text(text)).await {
            debug!("write failed: {}", e);
            metrics.record_error();
            break;
        }
    }
}

/// Reads frames until the peer closes, the transport fails or the
/// registry asks the connection to close.
async fn read_loop(mut ws_receiver: SplitStream<WebSocket>, connection: &Connection, state: &AppState) {
    let connection_id = connection.id();

    loop {
        let result = tokio::select! {
            _ = connection.closed() => {
                info!(connection_id, "connection closed by relay");
                break;
            }
            next = ws_receiver.next() => match next {
                Some(result) => result,
                None => break,
            },
        };

        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                warn!(connection_id, "WebSocket error: {}", e);
                state.metrics.record_error();
                break;
            }
        };

        match msg {
            Message::Text(text) => relay_frame(text, connection_id, state).await,
            Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => relay_frame(text.into(), connection_id, state).await,
                Err(_) => warn!(connection_id, "dropping non UTF-8 binary frame"),
            },
            Message::Ping(_) => debug!(connection_id, "received ping"),
            Message::Pong(_) => debug!(connection_id, "received pong"),
            Message::Close(frame) => {
                match frame {
                    Some(frame) => info!(
                        connection_id,
                        code = frame.code,
                        reason = frame.reason.as_str(),
                        "close requested"
                    ),
                    None => info!(connection_id, "close requested"),
                }
                break;
            }
        }
    }
}

/// Hands one inbound frame to the broadcast.
async fn relay_frame(text: Utf8Bytes, connection_id: u64, state: &AppState) {
    state.metrics.record_message_received();
    debug!(connection_id, frame = text.as_str(), "message");

    let report = state.registry.broadcast(&text).await;
    state.metrics.record_delivered(report.delivered);
    state.metrics.record_stale_dropped(report.dropped);
}
